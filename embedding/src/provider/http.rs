//! Production provider client backed by `reqwest` (§4.1).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use embedding_core::error::EmbeddingError;
use embedding_core::traits::EmbeddingProvider;
use embedding_core::types::Vector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const UNSET_DIMENSION: usize = 0;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponseItem {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingResponseItem>,
}

/// Calls a remote text-embedding HTTP endpoint. Stateless apart from the
/// dimension it latches from the first successful response — safe to share
/// behind an `Arc` across workers (§5 "Provider client: immutable").
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dimension: AtomicUsize,
}

impl HttpEmbeddingProvider {
    pub fn new(
        url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if api_key.is_empty() {
            return Err(EmbeddingError::ConfigMissing(
                "provider_api_key is not configured".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::TransportError(e.to_string()))?;
        Ok(Self {
            client,
            url,
            api_key,
            model,
            dimension: AtomicUsize::new(UNSET_DIMENSION),
        })
    }

    fn retryable_status(status: u16) -> bool {
        matches!(status, 408 | 429) || (500..600).contains(&status)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vector, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidQuery("empty text".into()));
        }

        debug!(chars = text.len(), model = %self.model, "issuing embedding request");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                input: text,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "transport error calling embedding provider");
                EmbeddingError::TransportError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let retry_after_seconds = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            let body = response.text().await.unwrap_or_default();
            if Self::retryable_status(code) {
                warn!(status = code, ?retry_after_seconds, "retryable provider error");
            }
            return Err(EmbeddingError::ProviderError {
                status: code,
                message: body,
                retry_after_seconds,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::TransportError(e.to_string()))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::TransportError("empty embedding response".into()))?
            .embedding;

        let observed = embedding.len();
        // Compare-and-set only when unset or matching: a rejected response
        // must never overwrite the latch with a bad dimension.
        let previous = self
            .dimension
            .compare_exchange(UNSET_DIMENSION, observed, Ordering::SeqCst, Ordering::SeqCst)
            .unwrap_or_else(|current| current);
        if previous != UNSET_DIMENSION && previous != observed {
            return Err(EmbeddingError::DimensionMismatch {
                expected: previous,
                actual: observed,
            });
        }

        Ok(Vector::new(embedding))
    }

    fn dimension(&self) -> Option<usize> {
        match self.dimension.load(Ordering::SeqCst) {
            UNSET_DIMENSION => None,
            d => Some(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_api_key() {
        let result = HttpEmbeddingProvider::new(
            "https://example.test/embeddings".into(),
            String::new(),
            "text-embedding-3-small".into(),
            Duration::from_secs(30),
        );
        assert!(matches!(result, Err(EmbeddingError::ConfigMissing(_))));
    }

    #[test]
    fn retryable_status_matches_spec_taxonomy() {
        assert!(HttpEmbeddingProvider::retryable_status(408));
        assert!(HttpEmbeddingProvider::retryable_status(429));
        assert!(HttpEmbeddingProvider::retryable_status(500));
        assert!(HttpEmbeddingProvider::retryable_status(503));
        assert!(!HttpEmbeddingProvider::retryable_status(400));
        assert!(!HttpEmbeddingProvider::retryable_status(401));
        assert!(!HttpEmbeddingProvider::retryable_status(404));
    }

    #[tokio::test]
    async fn dimension_starts_unset() {
        let provider = HttpEmbeddingProvider::new(
            "https://example.test/embeddings".into(),
            "key".into(),
            "text-embedding-3-small".into(),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(provider.dimension(), None);
    }
}
