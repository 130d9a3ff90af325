//! Deterministic provider for tests and local development (§4.1 ambient
//! requirement), grounded in the teacher's keyword-triggered mock pattern.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use embedding_core::error::EmbeddingError;
use embedding_core::traits::EmbeddingProvider;
use embedding_core::types::Vector;

/// Produces a deterministic vector for any text (same text -> same vector,
/// always) and records every call so tests can assert provider call counts
/// (used by testable properties 1 and 8 in SPEC_FULL.md §8).
///
/// Callers may pre-arm a number of failures for a specific text via
/// `fail_next`, consumed one at a time before the provider starts
/// succeeding — this is how S4/S5's "fails the first N calls" scenarios are
/// seeded.
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: Mutex<Vec<String>>,
    pending_failures: Mutex<HashMap<String, u32>>,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: Mutex::new(Vec::new()),
            pending_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Arm `count` transient failures for the next `count` calls embedding
    /// this exact text.
    pub fn fail_next(&self, text: &str, count: u32) {
        self.pending_failures
            .lock()
            .unwrap()
            .insert(text.to_string(), count);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, text: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == text)
            .count()
    }

    fn deterministic_vector(&self, text: &str) -> Vector {
        let mut values = Vec::with_capacity(self.dimension);
        let bytes = text.as_bytes();
        for i in 0..self.dimension {
            let byte = bytes.get(i % bytes.len().max(1)).copied().unwrap_or(0);
            let mixed = (byte as u32).wrapping_mul(2654435761).wrapping_add(i as u32);
            values.push(((mixed % 2000) as f32 - 1000.0) / 1000.0);
        }
        Vector::new(values)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vector, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidQuery("empty text".into()));
        }

        self.calls.lock().unwrap().push(text.to_string());

        let mut pending = self.pending_failures.lock().unwrap();
        if let Some(remaining) = pending.get_mut(text) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EmbeddingError::TransportError(
                    "mock provider: armed failure".into(),
                ));
            }
        }
        drop(pending);

        Ok(self.deterministic_vector(text))
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_yields_same_vector() {
        let provider = MockEmbeddingProvider::new(8);
        let a = provider.embed("hello").await.unwrap();
        let b = provider.embed("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimension(), 8);
    }

    #[tokio::test]
    async fn different_text_yields_different_vector() {
        let provider = MockEmbeddingProvider::new(8);
        let a = provider.embed("hello").await.unwrap();
        let b = provider.embed("world").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn armed_failures_are_consumed_then_succeed() {
        let provider = MockEmbeddingProvider::new(4);
        provider.fail_next("flaky", 2);

        assert!(provider.embed("flaky").await.is_err());
        assert!(provider.embed("flaky").await.is_err());
        assert!(provider.embed("flaky").await.is_ok());
        assert_eq!(provider.calls_for("flaky"), 3);
    }

    #[tokio::test]
    async fn empty_text_is_invalid_query() {
        let provider = MockEmbeddingProvider::new(4);
        assert!(matches!(
            provider.embed("").await,
            Err(EmbeddingError::InvalidQuery(_))
        ));
    }
}
