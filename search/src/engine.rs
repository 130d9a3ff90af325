//! Ranks stored vectors against a query vector by cosine similarity (§4.5).

use embedding_core::error::EmbeddingError;
use embedding_core::traits::{EmbeddingStore, SearchCandidate};
use embedding_core::types::{Filters, RecordKind, SearchHit, Vector};
use embedding_provider::EmbeddingService;

/// Which record kinds a search considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Documents,
    Knowledge,
    Both,
}

/// Query-time knobs (§4.5 `options`). Defaults come from `core::config::SearchSettings`.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: f32,
    pub scope: Scope,
    pub filters: Filters,
}

impl SearchOptions {
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.limit < 1 {
            return Err(EmbeddingError::InvalidQuery(
                "limit must be >= 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(EmbeddingError::InvalidQuery(
                "threshold must be within [-1, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// `(a·b) / (‖a‖·‖b‖)` — keep this loop tight and allocation-free (§9
/// "Similarity math"). Returns `None` if either magnitude is zero, per
/// §4.5 step 3 ("skip that candidate").
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return None;
    }
    Some(dot / (mag_a.sqrt() * mag_b.sqrt()))
}

fn score_candidates(
    kind: RecordKind,
    query: &[f32],
    candidates: Vec<SearchCandidate>,
    threshold: f32,
) -> Result<Vec<SearchHit>, EmbeddingError> {
    let mut hits = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let v = candidate.vector.as_slice();
        if v.len() != query.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: query.len(),
                actual: v.len(),
            });
        }
        let Some(score) = cosine_similarity(query, v) else {
            continue;
        };
        if score < threshold {
            continue;
        }
        hits.push(SearchHit {
            kind,
            id: candidate.id,
            score,
            projection: candidate.projection,
        });
    }
    Ok(hits)
}

/// Sort by score desc, tie-break id asc (§4.5 step 5), then truncate.
fn rank(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}

pub struct SimilaritySearchEngine<S: EmbeddingStore> {
    service: std::sync::Arc<EmbeddingService<S>>,
}

impl<S: EmbeddingStore> SimilaritySearchEngine<S> {
    pub fn new(service: std::sync::Arc<EmbeddingService<S>>) -> Self {
        Self { service }
    }

    /// The full search algorithm (§4.5 steps 1-7).
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, EmbeddingError> {
        if query.is_empty() {
            return Err(EmbeddingError::InvalidQuery("empty query".to_string()));
        }
        options.validate()?;

        let q = self.service.embed(query).await?;
        let hits = self.scan_and_score(&q, options).await?;
        Ok(rank(hits, options.limit))
    }

    async fn scan_and_score(
        &self,
        q: &Vector,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, EmbeddingError> {
        let mut hits = Vec::new();

        if matches!(options.scope, Scope::Documents | Scope::Both) {
            let candidates = self
                .service
                .store()
                .scan_documents_for_search(&options.filters)
                .await?;
            hits.extend(score_candidates(
                RecordKind::Document,
                q.as_slice(),
                candidates,
                options.threshold,
            )?);
        }

        if matches!(options.scope, Scope::Knowledge | Scope::Both) {
            let candidates = self
                .service
                .store()
                .scan_knowledge_for_search(&options.filters)
                .await?;
            hits.extend(score_candidates(
                RecordKind::Knowledge,
                q.as_slice(),
                candidates,
                options.threshold,
            )?);
        }

        Ok(hits)
    }

    /// Similar-to-record (§4.5 "Derived operation"): seed `q` from a stored
    /// record's own vector rather than a fresh provider call, and exclude
    /// the source record from its own results.
    pub async fn similar_to_record(
        &self,
        kind: RecordKind,
        id: &str,
        limit: usize,
        threshold: f32,
        scope: Scope,
        filters: Filters,
    ) -> Result<Vec<SearchHit>, EmbeddingError> {
        let source_vector = match kind {
            RecordKind::Document => self.service.store().get_document(id).await?.vector,
            RecordKind::Knowledge => self.service.store().get_knowledge(id).await?.vector,
        }
        .ok_or_else(|| EmbeddingError::VectorUnavailable(id.to_string()))?;

        let options = SearchOptions {
            limit: limit + 1, // +1 so excluding the source id still leaves `limit` results
            threshold,
            scope,
            filters,
        };
        options.validate()?;

        let mut hits = self.scan_and_score(&source_vector, &options).await?;
        hits.retain(|hit| !(hit.kind == kind && hit.id == id));
        Ok(rank(hits, limit))
    }
}
