//! In-process LRU cache, the default backend (§4.2 ambient requirement).
//!
//! No external dependency; bounded by entry count rather than memory size,
//! matching the teacher's `lru::LruCache` usage in `memory/src/embedding/*`.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use embedding_core::error::EmbeddingError;
use embedding_core::traits::EmbeddingCacheBackend;
use embedding_core::types::Vector;
use lru::LruCache;

struct Entry {
    vector: Vector,
    expires_at: Instant,
}

pub struct MemoryEmbeddingCache {
    inner: Mutex<LruCache<String, Entry>>,
}

impl MemoryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl EmbeddingCacheBackend for MemoryEmbeddingCache {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<Vector>, EmbeddingError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get(fingerprint) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.vector.clone())),
            Some(_) => {
                inner.pop(fingerprint);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        fingerprint: &str,
        vector: &Vector,
        ttl_seconds: u64,
    ) -> Result<(), EmbeddingError> {
        let mut inner = self.inner.lock().unwrap();
        inner.put(
            fingerprint.to_string(),
            Entry {
                vector: vector.clone(),
                expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn purge_all(&self) -> Result<(), EmbeddingError> {
        self.inner.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_miss_on_empty_cache() {
        let cache = MemoryEmbeddingCache::new(16);
        assert_eq!(cache.lookup("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_then_lookup_hits() {
        let cache = MemoryEmbeddingCache::new(16);
        let vector = Vector::new(vec![1.0, 2.0, 3.0]);
        cache.store("fp1", &vector, 3600).await.unwrap();
        assert_eq!(cache.lookup("fp1").await.unwrap(), Some(vector));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = MemoryEmbeddingCache::new(16);
        let vector = Vector::new(vec![1.0]);
        cache.store("fp1", &vector, 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.lookup("fp1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn purge_all_clears_entries() {
        let cache = MemoryEmbeddingCache::new(16);
        cache
            .store("fp1", &Vector::new(vec![1.0]), 3600)
            .await
            .unwrap();
        cache.purge_all().await.unwrap();
        assert_eq!(cache.lookup("fp1").await.unwrap(), None);
    }
}
