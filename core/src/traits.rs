//! Trait seams between the embedding engine's components (§4).
//!
//! `EmbeddingProvider` and `EmbeddingCacheBackend` are implemented by the
//! `embedding` crate; `EmbeddingStore` is implemented by the `store` crate.
//! Keeping the traits here (rather than alongside their implementations)
//! lets `search` and `pipeline` depend on the contracts without depending on
//! any one backend.

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::types::{Document, Filters, KnowledgeItem, Projection, Vector};

/// Stateless adapter calling the external embedding provider (§4.1).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text, returning a vector of the provider's dimension.
    async fn embed(&self, text: &str) -> Result<Vector, EmbeddingError>;

    /// The dimension D latched by the first successful call, if known.
    fn dimension(&self) -> Option<usize>;
}

/// Content-addressed cache for provider responses (§4.2).
///
/// Implementations must treat their own failures as non-fatal: callers
/// interpret any `Err` here as a cache miss and proceed to the provider.
#[async_trait]
pub trait EmbeddingCacheBackend: Send + Sync {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<Vector>, EmbeddingError>;

    async fn store(
        &self,
        fingerprint: &str,
        vector: &Vector,
        ttl_seconds: u64,
    ) -> Result<(), EmbeddingError>;

    /// Best-effort removal of all entries under the cache's namespace.
    async fn purge_all(&self) -> Result<(), EmbeddingError>;
}

/// Aggregate counts for operator visibility (§4.3 `stats()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub docs_total: u64,
    pub docs_with_vector: u64,
    pub knowledge_total_active: u64,
    pub knowledge_with_vector: u64,
}

/// A single candidate surfaced for similarity search (§4.3 `scan_*`).
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub id: String,
    pub projection: Projection,
    pub vector: Vector,
    /// Pre-computed score, only set when the store pushed down a native
    /// similarity operator (see DESIGN.md's Open Question decision #1).
    /// `search` always recomputes and re-sorts regardless of whether this
    /// is present.
    pub pushdown_score: Option<f32>,
}

/// Persistent operations over Documents and KnowledgeItems (§4.3).
///
/// Heterogeneous record kinds share no base type, only this capability —
/// the adapter exposes two parallel methods per operation rather than a
/// unified schema (§9 "Heterogeneous record kinds").
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn get_document(&self, id: &str) -> Result<Document, EmbeddingError>;
    async fn get_knowledge(&self, id: &str) -> Result<KnowledgeItem, EmbeddingError>;

    async fn set_document_vector(
        &self,
        id: &str,
        vector: Vector,
        processed_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), EmbeddingError>;

    async fn set_knowledge_vector(
        &self,
        id: &str,
        vector: Vector,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), EmbeddingError>;

    async fn unset_document_vector(&self, id: &str) -> Result<(), EmbeddingError>;
    async fn unset_knowledge_vector(&self, id: &str) -> Result<(), EmbeddingError>;

    async fn list_documents_missing_vector(
        &self,
        limit: usize,
    ) -> Result<Vec<String>, EmbeddingError>;

    async fn list_knowledge_missing_vector(
        &self,
        limit: usize,
    ) -> Result<Vec<String>, EmbeddingError>;

    /// Candidates with a vector and `state = Completed`, filtered.
    async fn scan_documents_for_search(
        &self,
        filters: &Filters,
    ) -> Result<Vec<SearchCandidate>, EmbeddingError>;

    /// Candidates with a vector and `active = true`, filtered.
    async fn scan_knowledge_for_search(
        &self,
        filters: &Filters,
    ) -> Result<Vec<SearchCandidate>, EmbeddingError>;

    async fn stats(&self) -> Result<StoreStats, EmbeddingError>;
}
