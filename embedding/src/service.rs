//! Orchestrates text -> vector with caching, and keeps stored records'
//! vectors current (§4.4).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use embedding_core::error::EmbeddingError;
use embedding_core::traits::{EmbeddingCacheBackend, EmbeddingProvider, EmbeddingStore};
use embedding_core::types::{TextFingerprint, Vector};
use tracing::warn;

/// Constructed once at startup with explicit dependencies (§9 "Global
/// client singletons") — no process-wide mutable state.
pub struct EmbeddingService<S: EmbeddingStore> {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn EmbeddingCacheBackend>,
    store: Arc<S>,
    cache_ttl_seconds: u64,
    batch_inter_call_delay: Duration,
}

impl<S: EmbeddingStore> EmbeddingService<S> {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn EmbeddingCacheBackend>,
        store: Arc<S>,
        cache_ttl_seconds: u64,
        batch_inter_call_delay: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            store,
            cache_ttl_seconds,
            batch_inter_call_delay,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// `embed(text) -> Vector` (§4.4).
    pub async fn embed(&self, text: &str) -> Result<Vector, EmbeddingError> {
        let fingerprint = TextFingerprint::of(text);

        match self.cache.lookup(fingerprint.as_str()).await {
            Ok(Some(vector)) => return Ok(vector),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cache lookup faulted, falling through to provider"),
        }

        let vector = self.provider.embed(text).await?;

        if let Err(e) = self
            .cache
            .store(fingerprint.as_str(), &vector, self.cache_ttl_seconds)
            .await
        {
            warn!(error = %e, "cache store faulted, proceeding without caching this result");
        }

        Ok(vector)
    }

    /// `embed_document(id)` (§4.4).
    pub async fn embed_document(&self, id: &str) -> Result<(), EmbeddingError> {
        let document = self.store.get_document(id).await?;
        let vector = self.embed(&document.body).await?;
        self.store
            .set_document_vector(id, vector, Utc::now())
            .await
    }

    /// `embed_knowledge(id)` (§4.4).
    pub async fn embed_knowledge(&self, id: &str) -> Result<(), EmbeddingError> {
        let item = self.store.get_knowledge(id).await?;
        let text = item.canonical_text();
        let vector = self.embed(&text).await?;
        self.store.set_knowledge_vector(id, vector, Utc::now()).await
    }

    /// `embed_batch(texts) -> [Vector]`: sequential, in input order, paced
    /// between successive *provider* calls (cache hits do not incur the
    /// delay), aborting on the first error with no partial return (§4.4).
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>, EmbeddingError> {
        let mut results = Vec::with_capacity(texts.len());
        let mut made_provider_call = false;

        for text in texts {
            let fingerprint = TextFingerprint::of(text);
            let cached = self.cache.lookup(fingerprint.as_str()).await.ok().flatten();

            let vector = match cached {
                Some(vector) => vector,
                None => {
                    if made_provider_call {
                        tokio::time::sleep(self.batch_inter_call_delay).await;
                    }
                    let vector = self.provider.embed(text).await?;
                    if let Err(e) = self
                        .cache
                        .store(fingerprint.as_str(), &vector, self.cache_ttl_seconds)
                        .await
                    {
                        warn!(error = %e, "cache store faulted during batch embed");
                    }
                    made_provider_call = true;
                    vector
                }
            };

            results.push(vector);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryEmbeddingCache;
    use crate::provider::MockEmbeddingProvider;
    use embedding_core::types::{Document, ProcessingState};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    struct FailingCacheBackend;

    #[async_trait::async_trait]
    impl EmbeddingCacheBackend for FailingCacheBackend {
        async fn lookup(&self, _fingerprint: &str) -> Result<Option<Vector>, EmbeddingError> {
            Err(EmbeddingError::CacheFault("connection refused".into()))
        }

        async fn store(
            &self,
            _fingerprint: &str,
            _vector: &Vector,
            _ttl_seconds: u64,
        ) -> Result<(), EmbeddingError> {
            Err(EmbeddingError::CacheFault("connection refused".into()))
        }

        async fn purge_all(&self) -> Result<(), EmbeddingError> {
            Err(EmbeddingError::CacheFault("connection refused".into()))
        }
    }

    struct InMemoryStoreStub {
        documents: StdMutex<StdHashMap<String, Document>>,
    }

    impl InMemoryStoreStub {
        fn with_document(doc: Document) -> Self {
            let mut map = StdHashMap::new();
            map.insert(doc.id.clone(), doc);
            Self {
                documents: StdMutex::new(map),
            }
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingStore for InMemoryStoreStub {
        async fn get_document(&self, id: &str) -> Result<Document, EmbeddingError> {
            self.documents
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| EmbeddingError::NotFound(id.to_string()))
        }

        async fn get_knowledge(
            &self,
            id: &str,
        ) -> Result<embedding_core::types::KnowledgeItem, EmbeddingError> {
            Err(EmbeddingError::NotFound(id.to_string()))
        }

        async fn set_document_vector(
            &self,
            id: &str,
            vector: Vector,
            processed_at: chrono::DateTime<Utc>,
        ) -> Result<(), EmbeddingError> {
            let mut docs = self.documents.lock().unwrap();
            let doc = docs
                .get_mut(id)
                .ok_or_else(|| EmbeddingError::NotFound(id.to_string()))?;
            doc.vector = Some(vector);
            doc.processed_at = Some(processed_at);
            Ok(())
        }

        async fn set_knowledge_vector(
            &self,
            id: &str,
            _vector: Vector,
            _updated_at: chrono::DateTime<Utc>,
        ) -> Result<(), EmbeddingError> {
            Err(EmbeddingError::NotFound(id.to_string()))
        }

        async fn unset_document_vector(&self, _id: &str) -> Result<(), EmbeddingError> {
            Ok(())
        }

        async fn unset_knowledge_vector(&self, _id: &str) -> Result<(), EmbeddingError> {
            Ok(())
        }

        async fn list_documents_missing_vector(
            &self,
            _limit: usize,
        ) -> Result<Vec<String>, EmbeddingError> {
            Ok(vec![])
        }

        async fn list_knowledge_missing_vector(
            &self,
            _limit: usize,
        ) -> Result<Vec<String>, EmbeddingError> {
            Ok(vec![])
        }

        async fn scan_documents_for_search(
            &self,
            _filters: &embedding_core::types::Filters,
        ) -> Result<Vec<embedding_core::traits::SearchCandidate>, EmbeddingError> {
            Ok(vec![])
        }

        async fn scan_knowledge_for_search(
            &self,
            _filters: &embedding_core::types::Filters,
        ) -> Result<Vec<embedding_core::traits::SearchCandidate>, EmbeddingError> {
            Ok(vec![])
        }

        async fn stats(&self) -> Result<embedding_core::traits::StoreStats, EmbeddingError> {
            Ok(embedding_core::traits::StoreStats::default())
        }
    }

    fn make_service(
        provider: Arc<MockEmbeddingProvider>,
        store: Arc<InMemoryStoreStub>,
    ) -> EmbeddingService<InMemoryStoreStub> {
        EmbeddingService::new(
            provider,
            Arc::new(MemoryEmbeddingCache::new(64)),
            store,
            3600,
            Duration::from_millis(0),
        )
    }

    fn stub_document(id: &str) -> Document {
        Document {
            id: id.to_string(),
            body: "hello world".into(),
            state: ProcessingState::Completed,
            vector: None,
            category: None,
            tags: vec![],
            classification_level: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn embed_is_cached_after_first_call() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let store = Arc::new(InMemoryStoreStub::with_document(stub_document("d1")));
        let service = make_service(provider.clone(), store);

        let a = service.embed("hello").await.unwrap();
        let b = service.embed("hello").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn embed_document_writes_vector_back() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let store = Arc::new(InMemoryStoreStub::with_document(stub_document("d1")));
        let service = make_service(provider, store.clone());

        service.embed_document("d1").await.unwrap();

        let doc = store.get_document("d1").await.unwrap();
        assert!(doc.vector.is_some());
        assert!(doc.processed_at.is_some());
    }

    #[tokio::test]
    async fn embed_document_not_found_propagates() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let store = Arc::new(InMemoryStoreStub::with_document(stub_document("d1")));
        let service = make_service(provider, store);

        let result = service.embed_document("missing").await;
        assert!(matches!(result, Err(EmbeddingError::NotFound(_))));
    }

    #[tokio::test]
    async fn embed_batch_preserves_order_and_caches() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let store = Arc::new(InMemoryStoreStub::with_document(stub_document("d1")));
        let service = make_service(provider.clone(), store);

        let texts = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let vectors = service.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[2]);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn embed_succeeds_through_a_cache_forced_into_failure() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let store = Arc::new(InMemoryStoreStub::with_document(stub_document("d1")));
        let service = EmbeddingService::new(
            provider.clone(),
            Arc::new(FailingCacheBackend),
            store,
            3600,
            Duration::from_millis(0),
        );

        let vector = service.embed("hello").await.unwrap();

        assert_eq!(vector.dimension(), 4);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn embed_batch_aborts_on_first_error() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        provider.fail_next("boom", 1);
        let store = Arc::new(InMemoryStoreStub::with_document(stub_document("d1")));
        let service = make_service(provider, store);

        let texts = vec!["ok".to_string(), "boom".to_string(), "never".to_string()];
        let result = service.embed_batch(&texts).await;

        assert!(result.is_err());
    }
}
