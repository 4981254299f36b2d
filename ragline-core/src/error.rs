//! Error types for the ragline core library.
//!
//! Uses `thiserror` for public API error types. Every failure path in the
//! engine maps to exactly one of the retrieval, generation or validation
//! kinds; configuration errors only surface while wiring the engine up.

use std::path::PathBuf;

/// Top-level error type for the ragline core library.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RagError {
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the vector index side of the pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    #[error("Vector index unreachable: {message}")]
    Unreachable { message: String },

    #[error("Invalid collection name '{name}': {reason}")]
    InvalidCollection { name: String, reason: String },

    #[error("Collection not found: {name}")]
    CollectionNotFound { name: String },

    #[error("Vector index returned an error: {message}")]
    Backend { message: String },

    #[error("Query embedding failed: {message}")]
    Embedding { message: String },

    #[error("Retrieval timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

/// Errors from the generation stage.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error("Generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Generation cancelled: token sink closed by caller")]
    Cancelled,
}

/// Errors from LLM provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Caller-level input errors. Enforced by the inbound layer, not the engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Question must not be empty")]
    EmptyQuestion,
}

/// Errors from the configuration system.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `RagError`.
pub type Result<T> = std::result::Result<T, RagError>;

/// Reject questions that are empty once surrounding whitespace is removed.
pub fn validate_question(question: &str) -> std::result::Result<(), ValidationError> {
    if question.trim().is_empty() {
        return Err(ValidationError::EmptyQuestion);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_retrieval() {
        let err = RagError::Retrieval(RetrievalError::Unreachable {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "Retrieval error: Vector index unreachable: connection refused"
        );
    }

    #[test]
    fn test_error_display_generation_is_transparent_over_provider() {
        let err = RagError::from(GenerationError::from(LlmError::Streaming {
            message: "stream reset".into(),
        }));
        assert_eq!(
            err.to_string(),
            "Generation error: Streaming error: stream reset"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = RagError::Generation(GenerationError::Timeout { timeout_secs: 5 });
        assert_eq!(err.to_string(), "Generation error: Generation timed out after 5s");
    }

    #[test]
    fn test_error_display_config() {
        let err = RagError::Config(ConfigError::FileNotFound {
            path: PathBuf::from("/missing/config.toml"),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Configuration file not found: /missing/config.toml"
        );
    }

    #[test]
    fn test_validate_question() {
        assert!(validate_question("what is ragline?").is_ok());
        assert!(matches!(
            validate_question(""),
            Err(ValidationError::EmptyQuestion)
        ));
        assert!(matches!(
            validate_question("  \n\t "),
            Err(ValidationError::EmptyQuestion)
        ));
    }
}
