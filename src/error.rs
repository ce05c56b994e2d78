//! Error taxonomy for the RAG core

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, RagError>;

/// Umbrella error type returned to callers of the RAG core
#[derive(Error, Debug)]
pub enum RagError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("extraction failed: {0}")]
    ExtractFailed(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors from the Model Client boundary (embedding + generation provider)
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("rate limited{}", .retry_after_ms.map(|ms| format!(", retry after {ms}ms")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request queue is full")]
    QueueFull,

    #[error("request timed out")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors from the Store boundary (document/chunk persistence)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document not found: {0}")]
    DocumentNotFound(uuid::Uuid),
}

impl RagError {
    /// The machine-readable error kind from the §7 taxonomy
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "ValidationError",
            RagError::ExtractFailed(_) => "ExtractFailed",
            RagError::Model(ModelError::RateLimited { .. }) => "ModelRateLimited",
            RagError::Model(ModelError::Transient(_)) => "ModelTransient",
            RagError::Model(ModelError::QueueFull) => "ModelQueueFull",
            RagError::Model(ModelError::Timeout) => "ModelTimeout",
            RagError::Model(ModelError::InvalidResponse(_)) => "Internal",
            RagError::Model(ModelError::DimensionMismatch { .. }) => "Internal",
            RagError::Store(_) => "StoreError",
            RagError::NotFound(_) => "NotFound",
            RagError::Internal(_) => "Internal",
        }
    }

    /// Whether the caller may reasonably retry this operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::Model(ModelError::Transient(_)) | RagError::Store(StoreError::Database(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_model_errors_to_taxonomy() {
        let rate_limited = RagError::Model(ModelError::RateLimited {
            retry_after_ms: Some(2000),
        });
        assert_eq!(rate_limited.kind(), "ModelRateLimited");

        let timeout = RagError::Model(ModelError::Timeout);
        assert_eq!(timeout.kind(), "ModelTimeout");
        assert!(!timeout.is_retryable());
    }

    #[test]
    fn transient_model_errors_are_retryable() {
        let err = RagError::Model(ModelError::Transient("connection reset".to_string()));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "ModelTransient");
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = RagError::Validation("title is required".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "ValidationError");
    }
}
