//! Error types for Refinr
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;

/// All error types that can escape the refine loop
#[derive(Debug, Error)]
pub enum RefinrError {
    /// Inference credential is absent; the loop never starts
    #[error("Missing credential: environment variable {env_var} not set")]
    MissingCredential { env_var: String },

    /// Configuration value is unusable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The caller supplied a blank initial prompt
    #[error("Initial prompt is empty")]
    EmptyPrompt,

    /// Invalid state transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller aborted the loop
    #[error("Refine loop was cancelled")]
    Cancelled,

    /// LLM transport error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML config parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RefinrError {
    /// Errors that mean the loop could not even begin
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            RefinrError::MissingCredential { .. } | RefinrError::InvalidConfig(_) | RefinrError::EmptyPrompt
        )
    }
}

/// Result type alias for Refinr operations
pub type Result<T> = std::result::Result<T, RefinrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_error() {
        let err = RefinrError::MissingCredential {
            env_var: "GRADIENT_MODEL_ACCESS_KEY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing credential: environment variable GRADIENT_MODEL_ACCESS_KEY not set"
        );
        assert!(err.is_startup());
    }

    #[test]
    fn test_invalid_config_error() {
        let err = RefinrError::InvalidConfig("max_iterations must be at least 1".to_string());
        assert_eq!(err.to_string(), "Invalid config: max_iterations must be at least 1");
        assert!(err.is_startup());
    }

    #[test]
    fn test_cancelled_is_not_startup() {
        let err = RefinrError::Cancelled;
        assert_eq!(err.to_string(), "Refine loop was cancelled");
        assert!(!err.is_startup());
    }

    #[test]
    fn test_llm_error_conversion() {
        let llm_err = LlmError::InvalidResponse("no body".to_string());
        let err: RefinrError = llm_err.into();
        assert!(matches!(err, RefinrError::Llm(_)));
        assert!(err.to_string().contains("no body"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RefinrError = io_err.into();
        assert!(matches!(err, RefinrError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("key: [unclosed").unwrap_err();
        let err: RefinrError = yaml_err.into();
        assert!(matches!(err, RefinrError::Yaml(_)));
    }
}
