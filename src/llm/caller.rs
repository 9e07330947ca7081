//! Inference caller - one prompt in, best-effort text out.
//!
//! Never fails on a bad response: malformed bodies are stringified and
//! transport failures that outlast the retry policy become a short error
//! string. Only cancellation escapes as an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{RefinrError, Result};
use crate::llm::client::LlmClient;
use crate::llm::extract::extract_text;
use crate::llm::retry::RetryPolicy;
use crate::llm::types::CompletionRequest;

/// Prefix marking text that stands in for a failed call
pub const TRANSPORT_FAILURE_PREFIX: &str = "[inference failed]";

/// Model parameters for one class of call (task or meta)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSettings {
    pub model: String,
    pub system: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CallSettings {
    /// Build the request for `prompt`
    pub fn request(&self, prompt: &str) -> CompletionRequest {
        CompletionRequest::new(&self.model)
            .with_system(&self.system)
            .with_user_message(prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

/// Where a completion's text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// A strategy found the top choice's text
    Extracted,
    /// The body had no recognizable text and was stringified
    Stringified,
    /// The call never produced a body
    TransportFailure,
}

/// Text produced by one inference call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub source: TextSource,
    pub attempts: u32,
}

impl Completion {
    /// True when the text is not model output
    pub fn is_degraded(&self) -> bool {
        self.source != TextSource::Extracted
    }
}

/// Sends prompts through an explicit client with retry and cancellation
#[derive(Clone)]
pub struct InferenceCaller {
    client: Arc<dyn LlmClient>,
    retry: RetryPolicy,
}

impl InferenceCaller {
    pub fn new(client: Arc<dyn LlmClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Run one logical call; retries happen inside
    pub async fn call(&self, settings: &CallSettings, prompt: &str, cancel: &CancellationToken) -> Result<Completion> {
        let request = settings.request(prompt);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(RefinrError::Cancelled);
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(RefinrError::Cancelled),
                result = self.client.complete(request.clone()) => result,
            };

            let error = match result {
                Ok(response) => {
                    let extracted = extract_text(&response.body);
                    let source = if extracted.is_fallback() {
                        log::warn!(
                            "{} reply for {} had no recognizable text; using raw body",
                            self.client.name(),
                            settings.model
                        );
                        TextSource::Stringified
                    } else {
                        log::debug!(
                            "{} reply for {} read via {}",
                            self.client.name(),
                            settings.model,
                            extracted.strategy.unwrap_or_default()
                        );
                        TextSource::Extracted
                    };
                    return Ok(Completion {
                        text: extracted.text,
                        source,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            if error.is_rate_limit() {
                log::warn!("{} rate limited {} on attempt {}", self.client.name(), settings.model, attempt);
            }

            match self.retry.next_delay(attempt, &error) {
                Some(delay) => {
                    log::warn!(
                        "{} call to {} failed (attempt {}): {}; retrying in {:?}",
                        self.client.name(),
                        settings.model,
                        attempt,
                        error,
                        delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RefinrError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    log::warn!(
                        "{} call to {} failed after {} attempt(s): {}",
                        self.client.name(),
                        settings.model,
                        attempt,
                        error
                    );
                    return Ok(Completion {
                        text: format!("{} {}", TRANSPORT_FAILURE_PREFIX, error),
                        source: TextSource::TransportFailure,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}
