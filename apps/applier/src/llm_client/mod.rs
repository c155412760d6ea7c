//! Anthropic Messages client used by the match judge.
//!
//! One operation: send a prompt, get a JSON object back. Transient failures
//! (rate limits, overload, 5xx, connect/timeout) are retried with backoff;
//! everything else is classified once and surfaced.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Used when `LLM_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
/// Match verdicts are a few lines of JSON.
const MAX_TOKENS: u32 = 1024;
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Could not reach the model API: {0}")]
    Transport(#[from] reqwest::Error),

    /// Rate limit or exhausted credit.
    #[error("Model API quota exceeded (status {status}): {message}")]
    Quota { status: u16, message: String },

    /// Overloaded or failing server side.
    #[error("Model API unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The request itself was refused: bad key, unknown model, bad payload.
    #[error("Model API rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A 2xx answer without the JSON object we asked for.
    #[error("Malformed model output: {0}")]
    Malformed(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(e) => e.is_timeout() || e.is_connect(),
            LlmError::Quota { status, .. } => *status == 429,
            LlmError::Unavailable { .. } => true,
            LlmError::Rejected { .. } | LlmError::Malformed(_) => false,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Asks `model` for a JSON object and deserializes it into `T`. The
    /// prompt must tell the model to answer with JSON only.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<T, LlmError> {
        let request = MessagesRequest {
            model,
            max_tokens: MAX_TOKENS,
            system,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut attempt = 0;
        let text = loop {
            match self.send(&request).await {
                Ok(text) => break text,
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = backoff(attempt);
                    warn!("Model call failed ({e}), retrying in {}ms", delay.as_millis());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        parse_json(&text)
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &body));
        }
        debug!("Model answered {} bytes", body.len());
        response_text(&body)
    }
}

/// 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.saturating_pow(attempt)
}

fn classify_failure(status: u16, body: &str) -> LlmError {
    let (kind, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.kind, envelope.error.message),
        Err(_) => (String::new(), body.trim().to_string()),
    };
    let out_of_credit = message.to_lowercase().contains("credit balance");

    match status {
        429 => LlmError::Quota { status, message },
        400 | 402 | 403 if out_of_credit || kind == "billing_error" => {
            LlmError::Quota { status, message }
        }
        // 529 is Anthropic's "overloaded".
        500..=599 => LlmError::Unavailable { status, message },
        _ => LlmError::Rejected { status, message },
    }
}

/// Text of the first text block of a Messages response.
fn response_text(body: &str) -> Result<String, LlmError> {
    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::Malformed(format!("response envelope: {e}")))?;
    response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .find_map(|block| block.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| LlmError::Malformed("no text in response".to_string()))
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    serde_json::from_str(strip_json_fences(text))
        .map_err(|e| LlmError::Malformed(format!("expected JSON object: {e}")))
}

/// Strips ```json ... ``` or ``` ... ``` fences some models add anyway.
pub(crate) fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    let inner = inner.trim_start();
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
