//! Error types for Memoria

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Memoria operations
#[derive(Error, Debug)]
pub enum MemoriaError {
    /// Key or record absent, or expired at read time
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tenant has reached its configured memory ceiling
    #[error("Quota exceeded for tenant '{tenant_id}': {detail}")]
    QuotaExceeded { tenant_id: String, detail: String },

    /// Operation forbidden by the tenant's policy, or no policy exists
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// A durable backend could not be reached. Absorbed at construction
    /// time by fallback substitution; callers never observe it.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The external embedding provider failed or returned a bad vector
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Caller-supplied deadline elapsed before the operation completed
    #[error("Operation deadline exceeded")]
    Timeout,

    /// Request envelope missing a field the operation requires, or an
    /// operation the target store does not support
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Storage-related errors (LanceDB, file system, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoriaError {
    /// Collapse this error into the serializable kind carried by
    /// response envelopes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoriaError::NotFound(_) => ErrorKind::NotFound,
            MemoriaError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            MemoriaError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            MemoriaError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            MemoriaError::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            MemoriaError::Timeout => ErrorKind::Timeout,
            MemoriaError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            MemoriaError::Storage(_)
            | MemoriaError::Config(_)
            | MemoriaError::Serialization(_)
            | MemoriaError::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Serializable error classification carried in [`MemoryResponse`]
/// envelopes.
///
/// [`MemoryResponse`]: crate::memory::request::MemoryResponse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    QuotaExceeded,
    PolicyViolation,
    BackendUnavailable,
    EmbeddingUnavailable,
    Timeout,
    InvalidRequest,
    Internal,
}

/// Result type alias for Memoria operations
pub type Result<T> = std::result::Result<T, MemoriaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            MemoriaError::NotFound("k".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            MemoriaError::QuotaExceeded {
                tenant_id: "t1".into(),
                detail: "full".into()
            }
            .kind(),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(MemoriaError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            MemoriaError::Storage("disk".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_error_kind_serialization() {
        let kinds = vec![
            ErrorKind::NotFound,
            ErrorKind::QuotaExceeded,
            ErrorKind::PolicyViolation,
            ErrorKind::BackendUnavailable,
            ErrorKind::EmbeddingUnavailable,
            ErrorKind::Timeout,
            ErrorKind::Internal,
        ];

        for kind in kinds {
            let json = serde_json::to_string(&kind).expect("Failed to serialize");
            let deserialized: ErrorKind =
                serde_json::from_str(&json).expect("Failed to deserialize");
            assert_eq!(kind, deserialized);
        }
    }
}
