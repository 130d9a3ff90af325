//! Redis-backed cache, for deployments that want cache state shared across
//! processes (§4.2 ambient requirement; §6 `GET`/`SET ... EX`/`SCAN`/`DEL`).

use async_trait::async_trait;
use embedding_core::error::EmbeddingError;
use embedding_core::traits::EmbeddingCacheBackend;
use embedding_core::types::Vector;
use redis::AsyncCommands;
use tracing::warn;

const NAMESPACE: &str = "embedding";

pub struct RedisEmbeddingCache {
    client: redis::Client,
}

impl RedisEmbeddingCache {
    pub fn new(redis_url: &str) -> Result<Self, EmbeddingError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| EmbeddingError::CacheFault(format!("invalid redis url: {e}")))?;
        Ok(Self { client })
    }

    fn key(fingerprint: &str) -> String {
        format!("{NAMESPACE}:{fingerprint}")
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, EmbeddingError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| EmbeddingError::CacheFault(e.to_string()))
    }
}

#[async_trait]
impl EmbeddingCacheBackend for RedisEmbeddingCache {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<Vector>, EmbeddingError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(Self::key(fingerprint))
            .await
            .map_err(|e| EmbeddingError::CacheFault(e.to_string()))?;

        match raw {
            Some(json) => serde_json::from_str::<Vec<f32>>(&json)
                .map(|values| Some(Vector::new(values)))
                .map_err(|e| {
                    warn!(error = %e, "corrupt cache entry, treating as miss");
                    EmbeddingError::CacheFault(e.to_string())
                }),
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        fingerprint: &str,
        vector: &Vector,
        ttl_seconds: u64,
    ) -> Result<(), EmbeddingError> {
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(vector.as_slice())
            .map_err(|e| EmbeddingError::CacheFault(e.to_string()))?;
        let _: () = conn
            .set_ex(Self::key(fingerprint), json, ttl_seconds.max(1))
            .await
            .map_err(|e| EmbeddingError::CacheFault(e.to_string()))?;
        Ok(())
    }

    async fn purge_all(&self) -> Result<(), EmbeddingError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{NAMESPACE}:*");
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| EmbeddingError::CacheFault(e.to_string()))?;
        if !keys.is_empty() {
            let _: () = conn
                .del(keys)
                .await
                .map_err(|e| EmbeddingError::CacheFault(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_uses_the_spec_namespace() {
        assert_eq!(RedisEmbeddingCache::key("abc123"), "embedding:abc123");
    }

    #[test]
    fn invalid_url_is_a_cache_fault_not_a_panic() {
        let result = RedisEmbeddingCache::new("not a valid redis url");
        assert!(matches!(result, Err(EmbeddingError::CacheFault(_))));
    }
}
