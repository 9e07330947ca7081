//! LLM Client Layer - chat-completion transport and best-effort text extraction
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for API abstraction, plus a mock
//! - GradientClient implementation
//! - Response text extraction strategies
//! - Retry policy and the degrade-to-string InferenceCaller

pub mod caller;
pub mod client;
pub mod extract;
pub mod gradient;
pub mod retry;
pub mod types;

pub use caller::{CallSettings, Completion, InferenceCaller, TRANSPORT_FAILURE_PREFIX, TextSource};
pub use client::{LlmClient, LlmError, MockLlmClient};
pub use extract::{Extracted, extract_text};
pub use gradient::{GradientClient, GradientConfig};
pub use retry::RetryPolicy;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, Usage};
