//! In-memory `EmbeddingStore`, used by tests and local development.
//!
//! Grounded in the concurrent-map idiom (`dashmap::DashMap`) used across the
//! teacher's backend implementations, rather than any one backend file
//! specifically — this adapter has no remote counterpart, it exists purely
//! to give the rest of the crate something to run against without a
//! database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use embedding_core::error::EmbeddingError;
use embedding_core::traits::{EmbeddingStore, SearchCandidate, StoreStats};
use embedding_core::types::{Document, Filters, KnowledgeItem, ProcessingState, Projection, Vector};
use serde_json::Value;

#[derive(Default)]
pub struct InMemoryEmbeddingStore {
    documents: DashMap<String, Document>,
    knowledge: DashMap<String, KnowledgeItem>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&self, document: Document) {
        self.documents.insert(document.id.clone(), document);
    }

    pub fn insert_knowledge(&self, item: KnowledgeItem) {
        self.knowledge.insert(item.id.clone(), item);
    }

    fn matches(filters: &Filters, fields: &HashMap<String, Value>) -> bool {
        for (key, expected) in &filters.equals {
            match fields.get(key) {
                Some(actual) if actual == expected => {}
                _ => return false,
            }
        }
        for (key, candidates) in &filters.any_of {
            match fields.get(key) {
                Some(Value::Array(items)) => {
                    if !items.iter().any(|item| candidates.contains(item)) {
                        return false;
                    }
                }
                Some(actual) => {
                    if !candidates.contains(actual) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    fn document_fields(doc: &Document) -> HashMap<String, Value> {
        let mut fields = HashMap::new();
        if let Some(category) = &doc.category {
            fields.insert("category".into(), Value::String(category.clone()));
        }
        if let Some(level) = &doc.classification_level {
            fields.insert(
                "classification_level".into(),
                Value::String(level.clone()),
            );
        }
        fields.insert(
            "tags".into(),
            Value::Array(doc.tags.iter().cloned().map(Value::String).collect()),
        );
        fields
    }

    fn knowledge_fields(item: &KnowledgeItem) -> HashMap<String, Value> {
        let mut fields = HashMap::new();
        if let Some(category) = &item.category {
            fields.insert("category".into(), Value::String(category.clone()));
        }
        fields.insert(
            "tags".into(),
            Value::Array(item.tags.iter().cloned().map(Value::String).collect()),
        );
        fields
    }
}

#[async_trait]
impl EmbeddingStore for InMemoryEmbeddingStore {
    async fn get_document(&self, id: &str) -> Result<Document, EmbeddingError> {
        self.documents
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| EmbeddingError::NotFound(id.to_string()))
    }

    async fn get_knowledge(&self, id: &str) -> Result<KnowledgeItem, EmbeddingError> {
        self.knowledge
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| EmbeddingError::NotFound(id.to_string()))
    }

    async fn set_document_vector(
        &self,
        id: &str,
        vector: Vector,
        processed_at: DateTime<Utc>,
    ) -> Result<(), EmbeddingError> {
        let mut entry = self
            .documents
            .get_mut(id)
            .ok_or_else(|| EmbeddingError::NotFound(id.to_string()))?;
        entry.vector = Some(vector);
        entry.processed_at = Some(processed_at);
        Ok(())
    }

    async fn set_knowledge_vector(
        &self,
        id: &str,
        vector: Vector,
        updated_at: DateTime<Utc>,
    ) -> Result<(), EmbeddingError> {
        let mut entry = self
            .knowledge
            .get_mut(id)
            .ok_or_else(|| EmbeddingError::NotFound(id.to_string()))?;
        entry.vector = Some(vector);
        entry.updated_at = Some(updated_at);
        Ok(())
    }

    async fn unset_document_vector(&self, id: &str) -> Result<(), EmbeddingError> {
        if let Some(mut entry) = self.documents.get_mut(id) {
            entry.vector = None;
        }
        Ok(())
    }

    async fn unset_knowledge_vector(&self, id: &str) -> Result<(), EmbeddingError> {
        if let Some(mut entry) = self.knowledge.get_mut(id) {
            entry.vector = None;
        }
        Ok(())
    }

    async fn list_documents_missing_vector(
        &self,
        limit: usize,
    ) -> Result<Vec<String>, EmbeddingError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| {
                entry.state == ProcessingState::Completed
                    && entry.vector.as_ref().is_none_or(Vector::is_empty)
            })
            .map(|entry| entry.id.clone())
            .take(limit)
            .collect())
    }

    async fn list_knowledge_missing_vector(
        &self,
        limit: usize,
    ) -> Result<Vec<String>, EmbeddingError> {
        Ok(self
            .knowledge
            .iter()
            .filter(|entry| entry.active && entry.vector.as_ref().is_none_or(Vector::is_empty))
            .map(|entry| entry.id.clone())
            .take(limit)
            .collect())
    }

    async fn scan_documents_for_search(
        &self,
        filters: &Filters,
    ) -> Result<Vec<SearchCandidate>, EmbeddingError> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.state == ProcessingState::Completed)
            .filter_map(|entry| {
                let vector = entry.vector.clone()?;
                if filters.is_empty() || Self::matches(filters, &Self::document_fields(&entry)) {
                    Some(SearchCandidate {
                        id: entry.id.clone(),
                        projection: Projection {
                            category: entry.category.clone(),
                            tags: entry.tags.clone(),
                            title: None,
                            classification_level: entry.classification_level.clone(),
                        },
                        vector,
                        pushdown_score: None,
                    })
                } else {
                    None
                }
            })
            .collect())
    }

    async fn scan_knowledge_for_search(
        &self,
        filters: &Filters,
    ) -> Result<Vec<SearchCandidate>, EmbeddingError> {
        Ok(self
            .knowledge
            .iter()
            .filter(|entry| entry.active)
            .filter_map(|entry| {
                let vector = entry.vector.clone()?;
                if filters.is_empty() || Self::matches(filters, &Self::knowledge_fields(&entry)) {
                    Some(SearchCandidate {
                        id: entry.id.clone(),
                        projection: Projection {
                            category: entry.category.clone(),
                            tags: entry.tags.clone(),
                            title: Some(entry.title.clone()),
                            classification_level: None,
                        },
                        vector,
                        pushdown_score: None,
                    })
                } else {
                    None
                }
            })
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats, EmbeddingError> {
        let docs_total = self.documents.len() as u64;
        let docs_with_vector = self
            .documents
            .iter()
            .filter(|e| e.vector.as_ref().is_some_and(|v| !v.is_empty()))
            .count() as u64;
        let knowledge_total_active = self.knowledge.iter().filter(|e| e.active).count() as u64;
        let knowledge_with_vector = self
            .knowledge
            .iter()
            .filter(|e| e.active && e.vector.as_ref().is_some_and(|v| !v.is_empty()))
            .count() as u64;
        Ok(StoreStats {
            docs_total,
            docs_with_vector,
            knowledge_total_active,
            knowledge_with_vector,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, state: ProcessingState, vector: Option<Vector>) -> Document {
        Document {
            id: id.to_string(),
            body: format!("body of {id}"),
            state,
            vector,
            category: Some("policy".into()),
            tags: vec!["finance".into()],
            classification_level: Some("public".into()),
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn list_documents_missing_vector_only_returns_completed_without_vector() {
        let store = InMemoryEmbeddingStore::new();
        store.insert_document(doc("d1", ProcessingState::Completed, None));
        store.insert_document(doc("d2", ProcessingState::Pending, None));
        store.insert_document(doc(
            "d3",
            ProcessingState::Completed,
            Some(Vector::new(vec![1.0])),
        ));

        let missing = store.list_documents_missing_vector(10).await.unwrap();
        assert_eq!(missing, vec!["d1".to_string()]);
    }

    #[tokio::test]
    async fn set_document_vector_fails_on_unknown_id() {
        let store = InMemoryEmbeddingStore::new();
        let result = store
            .set_document_vector("missing", Vector::new(vec![1.0]), Utc::now())
            .await;
        assert!(matches!(result, Err(EmbeddingError::NotFound(_))));
    }

    #[tokio::test]
    async fn unset_vector_is_idempotent_on_absent_vector() {
        let store = InMemoryEmbeddingStore::new();
        store.insert_document(doc("d1", ProcessingState::Completed, None));
        store.unset_document_vector("d1").await.unwrap();
        store.unset_document_vector("d1").await.unwrap();
    }

    #[tokio::test]
    async fn scan_documents_for_search_filters_by_category() {
        let store = InMemoryEmbeddingStore::new();
        store.insert_document(doc(
            "d1",
            ProcessingState::Completed,
            Some(Vector::new(vec![1.0, 0.0])),
        ));
        let mut other = doc(
            "d2",
            ProcessingState::Completed,
            Some(Vector::new(vec![0.0, 1.0])),
        );
        other.category = Some("legal".into());
        store.insert_document(other);

        let mut filters = Filters::default();
        filters
            .equals
            .insert("category".into(), serde_json::json!("policy"));

        let candidates = store.scan_documents_for_search(&filters).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "d1");
    }

    #[tokio::test]
    async fn stats_counts_totals_and_vectored() {
        let store = InMemoryEmbeddingStore::new();
        store.insert_document(doc("d1", ProcessingState::Completed, None));
        store.insert_document(doc(
            "d2",
            ProcessingState::Completed,
            Some(Vector::new(vec![1.0])),
        ));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.docs_total, 2);
        assert_eq!(stats.docs_with_vector, 1);
    }
}
