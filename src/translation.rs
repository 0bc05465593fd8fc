use std::sync::Arc;
use std::{error, fmt};

use futures_util::{StreamExt, TryStreamExt, future};
use serde::{Deserialize, Serialize};

use crate::transport::{FragmentStream, GeminiTransport, GenerationTransport, TransportError};
use crate::utilities::config::Config;

pub mod options;
pub mod prompt;

pub use options::{Language, Tone, TranslationOptions, TranslationRequest};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub translated_text: String,
    pub detected_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translator_notes: Option<String>,
}

/// The structured reply could not be read as a [`TranslationResult`].
#[derive(Debug)]
pub struct TranslationFailure(pub String);

impl fmt::Display for TranslationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected translation payload: {}", self.0)
    }
}

impl error::Error for TranslationFailure {}

#[derive(Debug)]
pub enum TranslationError {
    Transport(TransportError),
    Failure(TranslationFailure),
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "{err}"),
            Self::Failure(err) => write!(f, "{err}"),
        }
    }
}

impl error::Error for TranslationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Failure(err) => Some(err),
        }
    }
}

impl From<TransportError> for TranslationError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<TranslationFailure> for TranslationError {
    fn from(value: TranslationFailure) -> Self {
        Self::Failure(value)
    }
}

/// Translates manuscripts through a [`GenerationTransport`].
///
/// The translator holds no per-request state, so one instance can serve any
/// number of concurrent calls; each call opens its own request.
#[derive(Clone)]
pub struct Translator {
    transport: Arc<dyn GenerationTransport>,
}

impl Translator {
    pub fn new(transport: Arc<dyn GenerationTransport>) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Ok(Self::new(Arc::new(GeminiTransport::from_config(config)?)))
    }

    /// Streams the translation as it is generated. Empty fragments are never
    /// yielded. The caller is expected to reject empty `source_text`.
    pub async fn translate_stream(
        &self,
        source_text: &str,
        options: &TranslationOptions,
    ) -> Result<FragmentStream, TranslationError> {
        log::debug!(
            "streaming a translation of {} characters into {} ({})",
            source_text.chars().count(),
            options.target_language,
            options.tone
        );

        let instruction = prompt::stream_instruction(source_text, options);
        let fragments =
            self.transport.stream_generate(&instruction, prompt::SYSTEM_INSTRUCTION).await?;

        Ok(fragments.try_filter(|fragment| future::ready(!fragment.is_empty())).boxed())
    }

    /// Requests the whole translation at once, together with the detected
    /// source language and optional translator's notes.
    pub async fn translate(
        &self,
        source_text: &str,
        options: &TranslationOptions,
    ) -> Result<TranslationResult, TranslationError> {
        log::debug!(
            "requesting a structured translation of {} characters into {} ({})",
            source_text.chars().count(),
            options.target_language,
            options.tone
        );

        let instruction = prompt::structured_instruction(source_text, options);
        let payload = self
            .transport
            .generate_structured(&instruction, prompt::SYSTEM_INSTRUCTION, &prompt::result_schema())
            .await?;

        Ok(parse_result(&payload)?)
    }
}

fn parse_result(payload: &str) -> Result<TranslationResult, TranslationFailure> {
    let payload = if payload.trim().is_empty() { "{}" } else { payload };
    let failure = |err: serde_json::Error| TranslationFailure(err.to_string());

    // serde also fills a struct from a JSON array by position
    let value = serde_json::from_str::<serde_json::Value>(payload).map_err(failure)?;
    if !value.is_object() {
        return Err(TranslationFailure(format!("expected a JSON object, got {value}")));
    }

    serde_json::from_value(value).map_err(failure)
}
