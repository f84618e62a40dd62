//! Code-fixing oracle backed by a chat completion service.
//!
//! # Architecture
//!
//! The [`ChatBackend`] trait is the contract with the external generative
//! service: role-tagged messages, a model identifier and a temperature go in,
//! free-form text comes out. [`FixOracle`] builds the request for one seek
//! iteration and pulls candidate code out of the reply.
//!
//! - **Object-safe**: backends are held as `Arc<dyn ChatBackend>`
//! - **Thread-safe**: `Send + Sync` bounds for use across `.await`
//!
//! # Example
//!
//! ```rust,ignore
//! use seekloop::oracle::{FixOracle, OpenAiBackend};
//!
//! let backend = OpenAiBackend::new(api_key);
//! let oracle = FixOracle::new(Arc::new(backend), "gpt-4o", 0.2);
//! let candidate = oracle.propose(&original, "make the tests pass", &summary).await?;
//! ```

pub mod openai;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::attempt::AttemptSummary;

pub use openai::OpenAiBackend;

/// Fixed instruction framing the model as a code-fixing agent.
pub const SYSTEM_PROMPT: &str = "You are an automated code-fixing agent. You receive a piece of \
code and a goal. Reply with the complete modified code in a single fenced code block. Do not \
omit unchanged parts and do not add explanations outside the code block.";

// =============================================================================
// Errors
// =============================================================================

/// Errors from the generative service or from an unusable reply.
#[derive(Error, Debug)]
pub enum OracleError {
    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {message} (retry after {retry_after_secs}s)")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    /// Authentication failed - check API key.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Invalid request - check prompt/parameters.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Server error - may be transient.
    #[error("Server error: {message}")]
    ServerError { message: String },

    /// Network/connection error.
    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    /// Timeout waiting for response.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Invalid response from the service.
    #[error("Invalid API response: {message}")]
    InvalidResponse { message: String },

    /// The reply contained no code.
    #[error("Oracle returned no usable content")]
    EmptyResponse,
}

impl OracleError {
    /// Recommended wait before retrying, if the service gave one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }
}

// =============================================================================
// Chat protocol
// =============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A complete request to the generative service.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

/// Contract with the external generative service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the request and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns an [`OracleError`] if the service is unreachable, rejects the
    /// request, times out, or answers with something that cannot be parsed.
    async fn complete(&self, request: &ChatRequest) -> Result<String, OracleError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

// =============================================================================
// FixOracle
// =============================================================================

/// Proposes candidate code for one seek iteration.
#[derive(Clone)]
pub struct FixOracle {
    backend: Arc<dyn ChatBackend>,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for FixOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixOracle")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl FixOracle {
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature,
        }
    }

    /// Model identifier forwarded to the backend.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the request for one iteration.
    ///
    /// The attempt summary turn is only added once there is history.
    #[must_use]
    pub fn build_request(
        &self,
        original_code: &str,
        goal: &str,
        summary: &AttemptSummary,
    ) -> ChatRequest {
        let mut messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Original code:\n```\n{original_code}\n```\n\nGoal: {goal}"
            )),
        ];

        if !summary.is_empty() {
            messages.push(ChatMessage::user(format!(
                "{}\nAvoid repeating these failures.",
                summary.render()
            )));
        }

        ChatRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            messages,
        }
    }

    /// Ask the backend for a new candidate.
    ///
    /// # Errors
    ///
    /// Propagates backend errors and returns [`OracleError::EmptyResponse`]
    /// when the reply holds no code.
    pub async fn propose(
        &self,
        original_code: &str,
        goal: &str,
        summary: &AttemptSummary,
    ) -> Result<String, OracleError> {
        let request = self.build_request(original_code, goal, summary);
        debug!(
            "Requesting candidate from {} ({} messages, model {})",
            self.backend.name(),
            request.messages.len(),
            request.model
        );

        let reply = self.backend.complete(&request).await?;
        extract_code(&reply).ok_or(OracleError::EmptyResponse)
    }
}

/// Pull candidate code out of a free-form reply.
///
/// The body of the first fenced block wins, whatever its info string. An
/// unterminated fence yields everything after the opening line. Without any
/// fence the whole trimmed reply is used. Later blocks are ignored.
///
/// Returns `None` when the result is empty.
#[must_use]
pub fn extract_code(reply: &str) -> Option<String> {
    let code = match reply.find("```") {
        Some(start) => {
            let after_fence = &reply[start + 3..];
            let body_start = after_fence.find('\n').map_or(0, |i| i + 1);
            let body = &after_fence[body_start..];
            match body.find("```") {
                Some(end) => &body[..end],
                None => body,
            }
        }
        None => reply,
    };

    let code = code.trim_end_matches(['\n', '\r']);
    if code.trim().is_empty() {
        None
    } else if reply.contains("```") {
        Some(code.to_string())
    } else {
        Some(code.trim().to_string())
    }
}

// =============================================================================
// Mock backend
// =============================================================================

/// Scripted backend for tests.
///
/// Replies are consumed in order; once the script runs out the last reply
/// repeats. A scripted error is returned on the configured call.
///
/// # Example
///
/// ```rust
/// use seekloop::oracle::MockChatBackend;
///
/// let backend = MockChatBackend::new()
///     .with_reply("```\nfn main() {}\n```")
///     .fail_on_call(2, "service unavailable");
/// assert_eq!(backend.call_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct MockChatBackend {
    replies: Mutex<VecDeque<String>>,
    last_reply: Mutex<Option<String>>,
    fail_on: Option<(u32, String)>,
    call_count: AtomicU32,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply.
    #[must_use]
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply.into());
        }
        self
    }

    /// Fail the `call`-th request (1-based) with a server error.
    #[must_use]
    pub fn fail_on_call(mut self, call: u32, message: impl Into<String>) -> Self {
        self.fail_on = Some((call, message.into()));
        self
    }

    /// Number of `complete` calls so far.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, OracleError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some((fail_call, message)) = &self.fail_on {
            if *fail_call == call {
                return Err(OracleError::ServerError {
                    message: message.clone(),
                });
            }
        }

        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        let mut last = self
            .last_reply
            .lock()
            .map_err(|_| OracleError::InvalidResponse {
                message: "mock state poisoned".to_string(),
            })?;
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().ok_or(OracleError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
