//! OpenAI-compatible chat completions backend.
//!
//! Talks to any service exposing `POST {api_base}/chat/completions` with
//! bearer-token authentication. HTTP failures are mapped to structured
//! [`OracleError`] variants so the caller can tell a rate limit from a bad
//! key or an outage.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatBackend, ChatMessage, ChatRequest, OracleError};

/// Chat completions backend over HTTP.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout_secs: u64,
}

impl OpenAiBackend {
    /// Default API base URL.
    pub const DEFAULT_API_BASE: &'static str = "https://api.openai.com/v1";

    /// Default request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Create a backend authenticating with `api_key`.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set a custom API base URL (proxies, self-hosted gateways).
    #[must_use]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Full URL of the completions endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, OracleError> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        debug!(
            "Sending chat completion to {} (model {}, {} messages)",
            self.api_base,
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &text));
        }

        parse_completion(&text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

impl OpenAiBackend {
    fn map_transport_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            OracleError::ConnectionError {
                message: e.to_string(),
            }
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's content from a response body.
fn parse_completion(body: &str) -> Result<String, OracleError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| OracleError::InvalidResponse {
            message: format!("Failed to parse response: {e}"),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(OracleError::EmptyResponse)
}

/// Map an HTTP error status and body to an [`OracleError`].
pub fn error_from_response(status_code: u16, body: &str) -> OracleError {
    let message = error_message(body);

    match status_code {
        429 => OracleError::RateLimited {
            retry_after_secs: extract_retry_after(&message).unwrap_or(60),
            message,
        },
        401 | 403 => OracleError::AuthenticationFailed { message },
        400 | 404 | 422 => OracleError::InvalidRequest { message },
        408 | 504 => OracleError::Timeout { timeout_secs: 0 },
        500..=599 => OracleError::ServerError { message },
        _ => OracleError::InvalidResponse {
            message: format!("HTTP {status_code}: {message}"),
        },
    }
}

/// Pull `error.message` out of a JSON error body, or return the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn retry_after_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"retry.?after[:\s]+(\d+)",
            r"try again in (\d+)",
            r"(\d+)\s*seconds?",
        ]
        .into_iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Extract retry-after seconds from an error message.
fn extract_retry_after(message: &str) -> Option<u64> {
    let lower = message.to_lowercase();
    retry_after_patterns().iter().find_map(|re| {
        re.captures(&lower)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}
