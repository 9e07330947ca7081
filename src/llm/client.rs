//! Core LLM client trait, transport errors, and a scripted mock

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::llm::types::{CompletionRequest, CompletionResponse, Message};

/// Stateless LLM client - each call is independent (fresh context)
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Identifier used in logs
    fn name(&self) -> &str;
}

/// Errors that can occur during LLM transport
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::JsonError(_) => false,
        }
    }

    /// Server-suggested wait before retrying, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Mock LLM client for testing
///
/// Replays queued replies in order and records every request it receives.
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<Value, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    /// Create a mock with no queued replies
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that answers with the given texts, in order
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mock = Self::new();
        for text in texts {
            mock.push_text(text.as_ref());
        }
        mock
    }

    /// Queue a well-formed chat completion carrying `text`
    pub fn push_text(&self, text: &str) {
        self.push_body(Self::chat_body(text));
    }

    /// Queue an arbitrary response body
    pub fn push_body(&self, body: Value) {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).push_back(Ok(body));
    }

    /// Queue a transport error
    pub fn push_error(&self, error: LlmError) {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).push_back(Err(error));
    }

    /// Build an OpenAI-style chat completion body
    pub fn chat_body(text: &str) -> Value {
        json!({
            "id": "mock-completion",
            "object": "chat.completion",
            "choices": [
                {
                    "index": 0,
                    "message": Message::assistant(text),
                    "finish_reason": "stop"
                }
            ],
            "usage": { "prompt_tokens": 10, "completion_tokens": 20 }
        })
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of replies still queued
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).push(request);

        let reply = self.replies.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match reply {
            Some(Ok(body)) => Ok(CompletionResponse::from_body(body)),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::InvalidResponse("mock reply queue exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
