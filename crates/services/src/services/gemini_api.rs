//! Gemini API client for the assistant features.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Error)]
pub enum GeminiApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("missing api key: GEMINI_API_KEY environment variable not set")]
    MissingApiKey,
}

impl GeminiApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// One part of a request or response message. Either text or inline
/// base64-encoded media.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(content.into()),
            inline_data: None,
        }
    }

    pub fn image(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: BASE64.encode(bytes),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

impl GeminiResponse {
    /// Extract the first text part from the first candidate.
    pub fn text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|part| part.text.as_deref())
    }
}

/// Gemini API client
#[derive(Debug, Clone)]
pub struct GeminiApiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiApiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
    const MAX_OUTPUT_TOKENS: u32 = 4096;

    /// Create a new client using the GEMINI_API_KEY environment variable
    pub fn from_env() -> Result<Self, GeminiApiError> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| GeminiApiError::MissingApiKey)?;
        Self::new(api_key, None)
    }

    /// Create a new client with the given API key
    pub fn new(api_key: String, model: Option<String>) -> Result<Self, GeminiApiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("piscina/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeminiApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Send a text prompt and return the full generated answer.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<String>,
    ) -> Result<String, GeminiApiError> {
        self.generate_parts(vec![Part::text(prompt)], system).await
    }

    /// Send a prompt alongside an inline image, e.g. a photo of a test
    /// strip or pool equipment.
    pub async fn generate_from_image(
        &self,
        prompt: &str,
        mime_type: &str,
        image: &[u8],
        system: Option<String>,
    ) -> Result<String, GeminiApiError> {
        self.generate_parts(vec![Part::text(prompt), Part::image(mime_type, image)], system)
            .await
    }

    async fn generate_parts(
        &self,
        parts: Vec<Part>,
        system: Option<String>,
    ) -> Result<String, GeminiApiError> {
        let request = GeminiRequest {
            contents: vec![Content::user(parts)],
            system_instruction: system.map(|text| SystemInstruction {
                parts: vec![Part::text(text)],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: Self::MAX_OUTPUT_TOKENS,
            },
        };

        let response = (|| async { self.send_request(&request).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &GeminiApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Gemini API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await?;

        response
            .text()
            .map(|s| s.to_string())
            .ok_or_else(|| GeminiApiError::Serde("No text content in response".to_string()))
    }

    async fn send_request(&self, request: &GeminiRequest) -> Result<GeminiResponse, GeminiApiError> {
        let url = format!("{GEMINI_API_URL}/{}:generateContent", self.model);
        let res = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<GeminiResponse>()
                .await
                .map_err(|e| GeminiApiError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GeminiApiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(GeminiApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(GeminiApiError::Http { status, body })
            }
        }
    }

    /// Stream a text prompt, yielding answer fragments as they arrive.
    /// Streamed requests are not retried; a failure mid-stream surfaces as
    /// an error item.
    pub async fn generate_stream(
        &self,
        prompt: &str,
        system: Option<String>,
    ) -> Result<impl Stream<Item = Result<String, GeminiApiError>> + use<>, GeminiApiError> {
        let request = GeminiRequest {
            contents: vec![Content::user(vec![Part::text(prompt)])],
            system_instruction: system.map(|text| SystemInstruction {
                parts: vec![Part::text(text)],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: Self::MAX_OUTPUT_TOKENS,
            },
        };

        let url = format!("{GEMINI_API_URL}/{}:streamGenerateContent", self.model);
        let res = self
            .http
            .post(url)
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(GeminiApiError::InvalidApiKey);
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(GeminiApiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                return Err(GeminiApiError::Http { status, body });
            }
        }

        let stream = res
            .bytes_stream()
            .scan(SseBuffer::default(), |buffer, chunk| {
                let items: Vec<Result<String, GeminiApiError>> = match chunk {
                    Ok(bytes) => buffer
                        .push(&String::from_utf8_lossy(&bytes))
                        .iter()
                        .filter_map(|payload| parse_stream_event(payload).transpose())
                        .collect(),
                    Err(e) => vec![Err(map_reqwest_error(e))],
                };
                futures_util::future::ready(Some(futures_util::stream::iter(items)))
            })
            .flatten();

        Ok(stream)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GeminiApiError {
    if e.is_timeout() {
        GeminiApiError::Timeout
    } else {
        GeminiApiError::Transport(e.to_string())
    }
}

/// Accumulates raw SSE bytes and emits complete `data:` payloads. Events
/// may arrive split across chunks.
#[derive(Debug, Default)]
struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let mut payloads = Vec::new();
        while let Some(boundary) = self.pending.find("\n\n") {
            let event: String = self.pending.drain(..boundary + 2).collect();
            for line in event.lines() {
                if let Some(data) = line.strip_prefix("data:") {
                    payloads.push(data.trim().to_string());
                }
            }
        }
        payloads
    }
}

/// Extract the text fragment from one streamed event. Events that carry no
/// text (usage metadata, finish markers) yield `None`.
fn parse_stream_event(payload: &str) -> Result<Option<String>, GeminiApiError> {
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }
    let response: GeminiResponse =
        serde_json::from_str(payload).map_err(|e| GeminiApiError::Serde(e.to_string()))?;
    Ok(response.text().map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_extraction() {
        let json = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "A água está turva"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), Some("A água está turva"));
    }

    #[test]
    fn test_response_without_candidates() {
        let response: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), None);
    }

    #[test]
    fn test_sse_buffer_splits_events() {
        let mut buffer = SseBuffer::default();
        let payloads = buffer.push("data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_sse_buffer_handles_split_chunks() {
        let mut buffer = SseBuffer::default();
        assert!(buffer.push("data: {\"a\"").is_empty());
        let payloads = buffer.push(":1}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_parse_stream_event_extracts_fragment() {
        let payload = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"olá"}]}}]}"#;
        assert_eq!(parse_stream_event(payload).unwrap(), Some("olá".to_string()));
    }

    #[test]
    fn test_parse_stream_event_skips_non_text_events() {
        assert_eq!(parse_stream_event("").unwrap(), None);
        assert_eq!(parse_stream_event("[DONE]").unwrap(), None);
        assert_eq!(
            parse_stream_event(r#"{"candidates":[{"finishReason":"STOP"}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_stream_event_rejects_garbage() {
        assert!(matches!(
            parse_stream_event("not json"),
            Err(GeminiApiError::Serde(_))
        ));
    }

    #[test]
    fn test_image_part_is_base64_encoded() {
        let part = Part::image("image/png", b"abc");
        let inline = part.inline_data.unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "YWJj");
    }
}
