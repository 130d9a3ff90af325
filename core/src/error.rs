//! Crate-wide error taxonomy (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is not configured: {0}")]
    ConfigMissing(String),

    #[error("transport error reaching embedding provider: {0}")]
    TransportError(String),

    #[error("embedding provider returned status {status}: {message}")]
    ProviderError {
        status: u16,
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("record has no vector: {0}")]
    VectorUnavailable(String),

    #[error("cache fault (recovered as miss): {0}")]
    CacheFault(String),

    #[error("store fault: {0}")]
    StoreFault(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl EmbeddingError {
    /// Whether a failed operation may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::TransportError(_) => true,
            EmbeddingError::ProviderError { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            EmbeddingError::StoreFault(_) => true,
            EmbeddingError::ConfigMissing(_)
            | EmbeddingError::DimensionMismatch { .. }
            | EmbeddingError::NotFound(_)
            | EmbeddingError::InvalidQuery(_)
            | EmbeddingError::VectorUnavailable(_)
            | EmbeddingError::CacheFault(_)
            | EmbeddingError::Cancelled => false,
        }
    }

    /// Whether this error should halt a run entirely rather than be
    /// recorded per-item and skipped (§7 propagation policy).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EmbeddingError::ConfigMissing(_) | EmbeddingError::DimensionMismatch { .. }
        )
    }

    /// A server-supplied minimum wait, when the provider gave one (e.g. a
    /// `Retry-After` header on a 429). `None` means the caller's own retry
    /// delay applies unchanged.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            EmbeddingError::ProviderError {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(e: reqwest::Error) -> Self {
        EmbeddingError::TransportError(e.to_string())
    }
}

impl From<serde_json::Error> for EmbeddingError {
    fn from(e: serde_json::Error) -> Self {
        EmbeddingError::StoreFault(format!("serialization error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_rate_limit_are_retryable() {
        assert!(EmbeddingError::TransportError("boom".into()).is_retryable());
        assert!(
            EmbeddingError::ProviderError {
                status: 429,
                message: "slow down".into(),
                retry_after_seconds: Some(2),
            }
            .is_retryable()
        );
        assert!(
            EmbeddingError::ProviderError {
                status: 503,
                message: "unavailable".into(),
                retry_after_seconds: None,
            }
            .is_retryable()
        );
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(
            !EmbeddingError::ProviderError {
                status: 401,
                message: "unauthorized".into(),
                retry_after_seconds: None,
            }
            .is_retryable()
        );
        assert!(!EmbeddingError::NotFound("doc-1".into()).is_retryable());
        assert!(!EmbeddingError::CacheFault("redis down".into()).is_retryable());
    }

    #[test]
    fn retry_after_surfaces_only_the_providers_own_hint() {
        let hinted = EmbeddingError::ProviderError {
            status: 429,
            message: "slow down".into(),
            retry_after_seconds: Some(2),
        };
        assert_eq!(hinted.retry_after(), Some(2));
        assert_eq!(EmbeddingError::TransportError("boom".into()).retry_after(), None);
    }

    #[test]
    fn dimension_mismatch_and_config_missing_are_fatal() {
        assert!(
            EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
            .is_fatal()
        );
        assert!(EmbeddingError::ConfigMissing("no api key".into()).is_fatal());
        assert!(!EmbeddingError::NotFound("x".into()).is_fatal());
    }
}
