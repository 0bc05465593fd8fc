use std::borrow::Cow;
use std::fmt;
use std::pin::pin;

use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::transport::TransportError;
use crate::utilities::api_utils::DetectServerError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const STREAM_SEPARATOR: &[u8] = b"\n,\r\n";

const SAFETY_SETTINGS: &[SafetySetting] = &[
    SafetySetting { category: "HARM_CATEGORY_HARASSMENT", threshold: "BLOCK_NONE" },
    SafetySetting { category: "HARM_CATEGORY_HATE_SPEECH", threshold: "BLOCK_NONE" },
    SafetySetting { category: "HARM_CATEGORY_SEXUALLY_EXPLICIT", threshold: "BLOCK_NONE" },
    SafetySetting { category: "HARM_CATEGORY_DANGEROUS_CONTENT", threshold: "BLOCK_NONE" },
    SafetySetting { category: "HARM_CATEGORY_CIVIC_INTEGRITY", threshold: "BLOCK_NONE" },
];

pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
}

impl Endpoint {
    pub fn model_url(&self, model: &str, method: &str) -> Result<Url, url::ParseError> {
        let url = format!("{}/models/{model}:{method}", self.base_url.trim_end_matches('/'));
        Url::parse_with_params(&url, [("key", self.api_key.as_str())])
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Cow<'a, [Content<'a>]>,
    safety_settings: &'static [SafetySetting],
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Clone, Serialize)]
pub struct Content<'a> {
    pub parts: Cow<'a, [Part<'a>]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
}

impl<'a> Content<'a> {
    pub fn text(text: impl Into<Cow<'a, str>>, role: Option<&'static str>) -> Self {
        Self { parts: Cow::Owned(vec![Part::Text(text.into())]), role }
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part<'a> {
    Text(Cow<'a, str>),
}

#[derive(Serialize)]
pub struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

#[derive(Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig<'a> {
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<&'a Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<ContentResponse>,
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub struct ContentResponse {
    pub parts: Option<Vec<PartResponse>>,
}

#[derive(Deserialize)]
pub struct PartResponse {
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
    pub safety_ratings: Option<Vec<SafetyRating>>,
}

#[derive(Deserialize)]
pub struct SafetyRating {
    pub category: String,
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Deserialize)]
pub struct ErrorResponse {
    pub error: Error,
}

#[derive(Debug, Deserialize)]
pub struct Error {
    pub code: u16,
    pub message: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Google error {}: {}", self.code, self.message)
    }
}

/// The streaming endpoint reports errors as an array, the others as a single object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Many(Vec<ErrorResponse>),
    One(ErrorResponse),
}

fn parse_error_body(body: &[u8]) -> Option<Vec<Error>> {
    match serde_json::from_slice(body).ok()? {
        ErrorBody::Many(errors) => Some(errors.into_iter().map(|error| error.error).collect()),
        ErrorBody::One(error) => Some(vec![error.error]),
    }
}

fn error_from_body(status: StatusCode, body: &[u8]) -> TransportError {
    parse_error_body(body).map_or(TransportError::Status(status), TransportError::Google)
}

async fn read_error(response: reqwest::Response) -> TransportError {
    let status = response.status();

    match response.bytes().await {
        Ok(body) => error_from_body(status, &body),
        Err(err) => err.into(),
    }
}

impl GenerateContentResponse {
    fn check_blocked(&self) -> Result<(), TransportError> {
        let Some(block_reason) =
            self.prompt_feedback.as_ref().and_then(|feedback| feedback.block_reason.as_ref())
        else {
            return Ok(());
        };

        let categories = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.safety_ratings.as_ref())
            .map(|safety_ratings| {
                safety_ratings
                    .iter()
                    .filter(|safety_rating| safety_rating.blocked)
                    .map(|safety_rating| safety_rating.category.as_str())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if categories.is_empty() {
            Err(TransportError::Blocked(block_reason.clone()))
        } else {
            Err(TransportError::Blocked(format!("{block_reason} ({})", categories.join(", "))))
        }
    }

    /// Visible text of the first candidate. Thought summaries are skipped.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| content.parts.as_ref())
            .map(|parts| {
                parts
                    .iter()
                    .filter(|part| !part.thought)
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Turns one response (or one element of a streamed response) into its text.
pub fn response_fragment(response: GenerateContentResponse) -> Result<String, TransportError> {
    response.check_blocked()?;

    if let Some(finish_reason) =
        response.candidates.first().and_then(|candidate| candidate.finish_reason.as_deref())
    {
        if finish_reason != "STOP" {
            log::warn!("generation finished early: {finish_reason}");
        }
    }

    Ok(response.text())
}

async fn post(
    http_client: &reqwest::Client,
    url: Url,
    request: &GenerateContentRequest<'_>,
) -> Result<reqwest::Response, TransportError> {
    Ok(http_client.post(url).json(request).send().await?.server_error()?)
}

pub async fn generate_content<'a>(
    http_client: &reqwest::Client,
    url: Url,
    contents: Cow<'a, [Content<'a>]>,
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
) -> Result<GenerateContentResponse, TransportError> {
    let request = GenerateContentRequest {
        contents,
        safety_settings: SAFETY_SETTINGS,
        system_instruction,
        generation_config,
    };

    let response = post(http_client, url, &request).await?;

    if response.status() != StatusCode::OK {
        return Err(read_error(response).await);
    }

    Ok(response.json().await?)
}

/// Sends every element of the streamed response array through `tx` as it
/// arrives. Stops early once the receiving side is dropped.
pub async fn stream_generate_content<'a>(
    http_client: reqwest::Client,
    url: Url,
    tx: mpsc::UnboundedSender<Result<GenerateContentResponse, TransportError>>,
    contents: Cow<'a, [Content<'a>]>,
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
) {
    let request = GenerateContentRequest {
        contents,
        safety_settings: SAFETY_SETTINGS,
        system_instruction,
        generation_config,
    };

    let response = match post(&http_client, url, &request).await {
        Ok(response) => response,
        Err(err) => {
            tx.send(Err(err)).ok();
            return;
        }
    };

    if response.status() != StatusCode::OK {
        tx.send(Err(read_error(response).await)).ok();
        return;
    }

    forward_elements(response.bytes_stream(), &tx).await;
}

/// Splits a streamed response body into array elements and sends each one
/// through `tx`. Returns as soon as the receiving side is gone.
async fn forward_elements<S, B>(
    stream: S,
    tx: &mpsc::UnboundedSender<Result<GenerateContentResponse, TransportError>>,
) where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut stream = pin!(stream);
    let mut buffer = ResponseBuffer::default();

    while let Some(part) = stream.next().await {
        let part = match part {
            Ok(part) => part,
            Err(err) => {
                tx.send(Err(err.into())).ok();
                return;
            }
        };

        for element in buffer.push(part.as_ref()) {
            if tx.send(parse_element(&element)).is_err() {
                log::debug!("response stream receiver dropped");
                return;
            }
        }
    }

    if let Some(element) = buffer.finish() {
        tx.send(parse_element(&element)).ok();
    }
}

fn parse_element(element: &[u8]) -> Result<GenerateContentResponse, TransportError> {
    serde_json::from_slice(element).map_err(|err| TransportError::MalformedStream(err.to_string()))
}

/// Splits the JSON array returned by `streamGenerateContent` into its
/// elements while the bytes are still arriving.
#[derive(Default)]
struct ResponseBuffer {
    buffer: Vec<u8>,
    opened: bool,
}

impl ResponseBuffer {
    fn push(&mut self, part: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(part);

        if !self.opened {
            let Some(start) = self.buffer.iter().position(|byte| !byte.is_ascii_whitespace())
            else {
                return Vec::new();
            };

            if self.buffer[start] == b'[' {
                self.buffer.drain(..=start);
            }

            self.opened = true;
        }

        let mut elements = Vec::new();

        while let Some(index) =
            self.buffer.windows(STREAM_SEPARATOR.len()).position(|window| window == STREAM_SEPARATOR)
        {
            elements.push(self.buffer[..index].to_vec());
            self.buffer.drain(..index + STREAM_SEPARATOR.len());
        }

        elements
    }

    fn finish(self) -> Option<Vec<u8>> {
        let mut rest = self.buffer.trim_ascii();

        if let Some(stripped) = rest.strip_suffix(b"]") {
            rest = stripped.trim_ascii();
        }

        (!rest.is_empty()).then(|| rest.to_vec())
    }
}
