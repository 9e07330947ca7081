//! Bounded retry with exponential backoff for transient transport failures.
//!
//! Only errors that `LlmError::is_retryable` accepts are retried. Malformed
//! but received responses are not transport failures and never reach here.

use std::time::Duration;

use crate::llm::LlmError;

/// Retry policy for a single inference call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Decide whether attempt number `attempt` (1-indexed) that failed with
    /// `error` should be retried, and after how long.
    ///
    /// The delay is the larger of the server's retry-after hint and
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    pub fn next_delay(&self, attempt: u32, error: &LlmError) -> Option<Duration> {
        if attempt >= self.max_attempts.max(1) || !error.is_retryable() {
            return None;
        }

        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(16)));
        let delay = error.retry_after().map_or(exp, |hint| hint.max(exp));

        Some(delay.min(self.max_delay))
    }
}
