//! Error types for calforge operations.
//!
//! Defines error types for the subsystems that talk to external
//! collaborators:
//! - AI backend invocation (transport, rate limiting, schema parsing,
//!   cached-context expiry)
//! - Data source collection
//!
//! Pipeline-internal errors (configuration, context ordering, run aborts)
//! live next to the modules that raise them.

use thiserror::Error;

/// Errors that can occur during AI backend operations.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("Missing API key: CALFORGE_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: CALFORGE_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("AI call timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error {code}: {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse AI response: {0}")]
    ParseError(String),

    #[error("Response violates output schema: {0}")]
    SchemaViolation(String),

    #[error("Cached context handle '{0}' has expired")]
    CacheExpired(String),

    #[error("Run was cancelled")]
    Cancelled,
}

impl AiError {
    /// Whether this error is worth retrying with backoff.
    ///
    /// Transient failures are network-level errors, timeouts, rate limits,
    /// and 5xx-class responses. Schema violations get their own repair pass
    /// and are retried separately; cache expiry triggers a raw-context
    /// fallback rather than a retry.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::RequestFailed(_) | AiError::Timeout(_) | AiError::RateLimited(_) => true,
            AiError::ApiError { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

/// Errors that can occur inside data source adapters.
///
/// Adapters never surface these to the registry: a failed fetch becomes a
/// zero-quality placeholder snapshot. The type exists so adapter internals
/// can use `?` before converting at the boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source payload file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse source payload: {0}")]
    ParseError(String),

    #[error("Source fetch timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AiError::RequestFailed("connection reset".into()).is_transient());
        assert!(AiError::Timeout(60).is_transient());
        assert!(AiError::RateLimited("slow down".into()).is_transient());
        assert!(AiError::ApiError {
            code: 503,
            message: "unavailable".into()
        }
        .is_transient());

        assert!(!AiError::ApiError {
            code: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!AiError::SchemaViolation("missing field".into()).is_transient());
        assert!(!AiError::CacheExpired("h-1".into()).is_transient());
        assert!(!AiError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = AiError::ApiError {
            code: 502,
            message: "bad gateway".into(),
        };
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("bad gateway"));

        let err = SourceError::FileNotFound("strategy.json".into());
        assert!(err.to_string().contains("strategy.json"));
    }
}
