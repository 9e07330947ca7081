//! Gradient serverless inference client
//!
//! Implements the LlmClient trait for DigitalOcean's OpenAI-compatible
//! chat-completions endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{RefinrError, Result};
use crate::llm::client::{LlmClient, LlmError};
use crate::llm::types::{CompletionRequest, CompletionResponse, Usage};

/// Default chat-completions endpoint
pub const DEFAULT_BASE_URL: &str = "https://inference.do-ai.run/v1/chat/completions";

/// Environment variable holding the model access key
pub const DEFAULT_API_KEY_ENV: &str = "GRADIENT_MODEL_ACCESS_KEY";

/// Configuration for the Gradient client
#[derive(Debug, Clone)]
pub struct GradientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Gradient inference API client
pub struct GradientClient {
    client: Client,
    api_key: String,
    config: GradientConfig,
    usage: Arc<Mutex<Usage>>,
}

impl GradientClient {
    /// Create a client with an explicit API key
    ///
    /// The key is resolved by the caller (see `Config::api_key`)
    pub fn with_api_key(api_key: String, config: GradientConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RefinrError::InvalidConfig("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RefinrError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            config,
            usage: Arc::new(Mutex::new(Usage::default())),
        })
    }

    /// Build the request body for the chat-completions API
    fn build_request(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        })
    }

    /// Send a request to the inference endpoint
    async fn send_request(&self, body: Value) -> std::result::Result<Value, LlmError> {
        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout)
                } else {
                    LlmError::Network(e)
                }
            })?;

        let status = response.status();

        // Handle rate limiting
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        // Handle other errors
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        // A body that is not JSON is still text the loop can evaluate
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Record usage from a parsed response
    fn record_usage(&self, usage: &Usage) {
        self.usage.lock().unwrap_or_else(|e| e.into_inner()).add(usage);
    }

    /// Get cumulative token usage
    pub fn total_usage(&self) -> Usage {
        *self.usage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmClient for GradientClient {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request);
        let raw = self.send_request(body).await?;
        let response = CompletionResponse::from_body(raw);
        self.record_usage(&response.usage);
        Ok(response)
    }

    fn name(&self) -> &str {
        "gradient"
    }
}

impl std::fmt::Debug for GradientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradientClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}
