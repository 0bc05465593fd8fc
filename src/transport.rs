use std::borrow::Cow;
use std::{error, fmt};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, stream};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::apis::google_aistudio::{self, Content, Endpoint, GenerationConfig};
use crate::utilities::api_utils::ServerError;
use crate::utilities::config::Config;

/// Text fragments in the order the remote model produced them.
pub type FragmentStream = BoxStream<'static, Result<String, TransportError>>;

#[derive(Debug)]
pub enum TransportError {
    Network(reqwest::Error),
    Server(StatusCode),
    Status(StatusCode),
    Google(Vec<google_aistudio::Error>),
    Blocked(String),
    MalformedStream(String),
    InvalidUrl(url::ParseError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(err) => {
                write!(f, "HTTP error: {err}")?;

                if let Some(source) = error::Error::source(err) {
                    write!(f, ": {source}")?;
                }

                Ok(())
            }
            Self::Server(status_code) => {
                write!(f, "the generation service is currently offline ({status_code})")
            }
            Self::Status(status_code) => {
                write!(f, "the generation service responded with {status_code}")
            }
            Self::Google(errors) => {
                let errors = errors.iter().map(ToString::to_string).collect::<Vec<_>>();
                f.write_str(&errors.join("; "))
            }
            Self::Blocked(reason) => write!(f, "request blocked by Google: {reason}"),
            Self::MalformedStream(reason) => write!(f, "malformed response stream: {reason}"),
            Self::InvalidUrl(err) => write!(f, "invalid API URL: {err}"),
        }
    }
}

impl error::Error for TransportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Network(err) => Some(err),
            Self::InvalidUrl(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        // the request URL carries the API key
        Self::Network(value.without_url())
    }
}

impl From<ServerError> for TransportError {
    fn from(value: ServerError) -> Self {
        Self::Server(value.0)
    }
}

impl From<url::ParseError> for TransportError {
    fn from(value: url::ParseError) -> Self {
        Self::InvalidUrl(value)
    }
}

/// The remote model, reduced to the two calls a translator needs.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn stream_generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<FragmentStream, TransportError>;

    /// Returns the raw text payload, which should be JSON conforming to `schema`.
    async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: &str,
        schema: &Value,
    ) -> Result<String, TransportError>;
}

pub struct GeminiTransport {
    http_client: reqwest::Client,
    endpoint: Endpoint,
    model: String,
    max_output_tokens: u32,
}

impl GeminiTransport {
    pub const fn new(
        http_client: reqwest::Client,
        endpoint: Endpoint,
        model: String,
        max_output_tokens: u32,
    ) -> Self {
        Self { http_client, endpoint, model, max_output_tokens }
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Ok(Self::new(
            config.http_client()?,
            Endpoint { base_url: config.base_url.clone(), api_key: config.api_key.clone() },
            config.model.clone(),
            config.max_output_tokens,
        ))
    }
}

#[async_trait]
impl GenerationTransport for GeminiTransport {
    async fn stream_generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<FragmentStream, TransportError> {
        let url = self.endpoint.model_url(&self.model, "streamGenerateContent")?;
        let http_client = self.http_client.clone();
        let contents = vec![Content::text(prompt.to_owned(), Some("user"))];
        let system_instruction = Content::text(system_instruction.to_owned(), None);
        let generation_config =
            GenerationConfig { max_output_tokens: self.max_output_tokens, ..Default::default() };
        let (tx, rx) = mpsc::unbounded_channel();

        log::debug!("streaming from {}", self.model);

        tokio::spawn(async move {
            google_aistudio::stream_generate_content(
                http_client,
                url,
                tx,
                Cow::Owned(contents),
                Some(system_instruction),
                generation_config,
            )
            .await;
        });

        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
            .map(|response| response.and_then(google_aistudio::response_fragment))
            .boxed())
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: &str,
        schema: &Value,
    ) -> Result<String, TransportError> {
        let url = self.endpoint.model_url(&self.model, "generateContent")?;
        let contents = [Content::text(prompt, Some("user"))];

        log::debug!("requesting structured output from {}", self.model);

        let response = google_aistudio::generate_content(
            &self.http_client,
            url,
            Cow::Borrowed(contents.as_slice()),
            Some(Content::text(system_instruction, None)),
            GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                response_mime_type: Some("application/json"),
                response_schema: Some(schema),
            },
        )
        .await?;

        google_aistudio::response_fragment(response)
    }
}
