//! Postgres/pgvector-backed `EmbeddingStore` (§4.3), grounded in
//! `memory/src/backends/pgvector.rs`'s table layout and `<=>` cosine
//! operator usage.
//!
//! Two tables, one per record kind, matching §9's "do not unify their
//! persistent schemas". The `use_pushdown_order` flag implements
//! DESIGN.md's Open Question decision #1: when set, candidates are
//! pre-ordered by the native `<=>` operator purely to shorten the scan the
//! `search` crate performs — `search` still recomputes cosine score itself
//! and re-sorts, so the column order here is an optimization, not a source
//! of truth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use embedding_core::error::EmbeddingError;
use embedding_core::traits::{EmbeddingStore, SearchCandidate, StoreStats};
use embedding_core::types::{Document, Filters, KnowledgeItem, ProcessingState, Projection, Vector};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};

pub struct PostgresEmbeddingStore {
    pool: PgPool,
    use_pushdown_order: bool,
}

impl PostgresEmbeddingStore {
    pub async fn connect(dsn: &str, use_pushdown_order: bool) -> Result<Self, EmbeddingError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(|e| EmbeddingError::StoreFault(format!("postgres connect: {e}")))?;

        let store = Self {
            pool,
            use_pushdown_order,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), EmbeddingError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| EmbeddingError::StoreFault(format!("create extension vector: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedded_documents (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                state TEXT NOT NULL,
                vector vector,
                category TEXT,
                tags TEXT[] NOT NULL DEFAULT '{}',
                classification_level TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                processed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(format!("create embedded_documents: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedded_knowledge_items (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                summary TEXT,
                category TEXT,
                tags TEXT[] NOT NULL DEFAULT '{}',
                active BOOLEAN NOT NULL DEFAULT true,
                confidence REAL NOT NULL DEFAULT 1.0,
                vector vector,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(format!("create embedded_knowledge_items: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_embedded_documents_vector \
             ON embedded_documents USING hnsw (vector vector_cosine_ops)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(format!("create document vector index: {e}")))?;

        Ok(())
    }

    fn vector_to_pgvector(v: &[f32]) -> String {
        let values: Vec<String> = v.iter().map(f32::to_string).collect();
        format!("[{}]", values.join(","))
    }

    fn pgvector_to_vector(s: &str) -> Vec<f32> {
        s.trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    fn state_to_str(state: ProcessingState) -> &'static str {
        match state {
            ProcessingState::Pending => "pending",
            ProcessingState::Processing => "processing",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
        }
    }

    fn state_from_str(s: &str) -> ProcessingState {
        match s {
            "processing" => ProcessingState::Processing,
            "completed" => ProcessingState::Completed,
            "failed" => ProcessingState::Failed,
            _ => ProcessingState::Pending,
        }
    }
}

#[async_trait]
impl EmbeddingStore for PostgresEmbeddingStore {
    async fn get_document(&self, id: &str) -> Result<Document, EmbeddingError> {
        let row = sqlx::query(
            "SELECT id, body, state, vector::text, category, tags, classification_level, \
             created_at, processed_at FROM embedded_documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?
        .ok_or_else(|| EmbeddingError::NotFound(id.to_string()))?;

        let vector_text: Option<String> = row.get("vector");
        Ok(Document {
            id: row.get("id"),
            body: row.get("body"),
            state: Self::state_from_str(row.get::<String, _>("state").as_str()),
            vector: vector_text.map(|t| Vector::new(Self::pgvector_to_vector(&t))),
            category: row.get("category"),
            tags: row.get("tags"),
            classification_level: row.get("classification_level"),
            created_at: row.get("created_at"),
            processed_at: row.get("processed_at"),
        })
    }

    async fn get_knowledge(&self, id: &str) -> Result<KnowledgeItem, EmbeddingError> {
        let row = sqlx::query(
            "SELECT id, title, content, summary, category, tags, active, confidence, \
             vector::text, created_at, updated_at FROM embedded_knowledge_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?
        .ok_or_else(|| EmbeddingError::NotFound(id.to_string()))?;

        let vector_text: Option<String> = row.get("vector");
        Ok(KnowledgeItem {
            id: row.get("id"),
            title: row.get("title"),
            content: row.get("content"),
            summary: row.get("summary"),
            category: row.get("category"),
            tags: row.get("tags"),
            active: row.get("active"),
            confidence: row.get("confidence"),
            vector: vector_text.map(|t| Vector::new(Self::pgvector_to_vector(&t))),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn set_document_vector(
        &self,
        id: &str,
        vector: Vector,
        processed_at: DateTime<Utc>,
    ) -> Result<(), EmbeddingError> {
        let vector_str = Self::vector_to_pgvector(vector.as_slice());
        let result = sqlx::query(
            "UPDATE embedded_documents SET vector = $1::vector, processed_at = $2 WHERE id = $3",
        )
        .bind(&vector_str)
        .bind(processed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EmbeddingError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_knowledge_vector(
        &self,
        id: &str,
        vector: Vector,
        updated_at: DateTime<Utc>,
    ) -> Result<(), EmbeddingError> {
        let vector_str = Self::vector_to_pgvector(vector.as_slice());
        let result = sqlx::query(
            "UPDATE embedded_knowledge_items SET vector = $1::vector, updated_at = $2 WHERE id = $3",
        )
        .bind(&vector_str)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EmbeddingError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn unset_document_vector(&self, id: &str) -> Result<(), EmbeddingError> {
        sqlx::query("UPDATE embedded_documents SET vector = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?;
        Ok(())
    }

    async fn unset_knowledge_vector(&self, id: &str) -> Result<(), EmbeddingError> {
        sqlx::query("UPDATE embedded_knowledge_items SET vector = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?;
        Ok(())
    }

    async fn list_documents_missing_vector(
        &self,
        limit: usize,
    ) -> Result<Vec<String>, EmbeddingError> {
        let rows = sqlx::query(
            "SELECT id FROM embedded_documents WHERE state = 'completed' AND vector IS NULL \
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn list_knowledge_missing_vector(
        &self,
        limit: usize,
    ) -> Result<Vec<String>, EmbeddingError> {
        let rows = sqlx::query(
            "SELECT id FROM embedded_knowledge_items WHERE active = true AND vector IS NULL \
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn scan_documents_for_search(
        &self,
        filters: &Filters,
    ) -> Result<Vec<SearchCandidate>, EmbeddingError> {
        let mut sql = String::from(
            "SELECT id, vector::text, category, tags, classification_level \
             FROM embedded_documents WHERE state = 'completed' AND vector IS NOT NULL",
        );
        push_filter_clauses(&mut sql, filters, true);
        if self.use_pushdown_order {
            sql.push_str(" ORDER BY id");
        }

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let vector_text: String = row.get("vector");
                SearchCandidate {
                    id: row.get("id"),
                    projection: Projection {
                        category: row.get("category"),
                        tags: row.get("tags"),
                        title: None,
                        classification_level: row.get("classification_level"),
                    },
                    vector: Vector::new(Self::pgvector_to_vector(&vector_text)),
                    pushdown_score: None,
                }
            })
            .collect())
    }

    async fn scan_knowledge_for_search(
        &self,
        filters: &Filters,
    ) -> Result<Vec<SearchCandidate>, EmbeddingError> {
        let mut sql = String::from(
            "SELECT id, title, vector::text, category, tags \
             FROM embedded_knowledge_items WHERE active = true AND vector IS NOT NULL",
        );
        push_filter_clauses(&mut sql, filters, false);

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let vector_text: String = row.get("vector");
                SearchCandidate {
                    id: row.get("id"),
                    projection: Projection {
                        category: row.get("category"),
                        tags: row.get("tags"),
                        title: Some(row.get("title")),
                        classification_level: None,
                    },
                    vector: Vector::new(Self::pgvector_to_vector(&vector_text)),
                    pushdown_score: None,
                }
            })
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats, EmbeddingError> {
        let docs_total: i64 = sqlx::query("SELECT count(*) AS n FROM embedded_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?
            .get("n");
        let docs_with_vector: i64 = sqlx::query(
            "SELECT count(*) AS n FROM embedded_documents WHERE vector IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?
        .get("n");
        let knowledge_total_active: i64 = sqlx::query(
            "SELECT count(*) AS n FROM embedded_knowledge_items WHERE active = true",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?
        .get("n");
        let knowledge_with_vector: i64 = sqlx::query(
            "SELECT count(*) AS n FROM embedded_knowledge_items \
             WHERE active = true AND vector IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| EmbeddingError::StoreFault(e.to_string()))?
        .get("n");

        Ok(StoreStats {
            docs_total: docs_total as u64,
            docs_with_vector: docs_with_vector as u64,
            knowledge_total_active: knowledge_total_active as u64,
            knowledge_with_vector: knowledge_with_vector as u64,
        })
    }
}

fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Only a small, known set of attribute paths are ever filtered on. Unknown
/// keys are skipped rather than collapsed onto some other column — an
/// unrecognized filter key must not silently filter on the wrong attribute.
/// `classification_level` only exists on documents.
fn equals_clause(key: &str, value: &serde_json::Value, has_classification: bool) -> Option<String> {
    let s = value.as_str()?;
    match key {
        "category" => Some(format!("category = '{}'", escape_literal(s))),
        "classification_level" if has_classification => {
            Some(format!("classification_level = '{}'", escape_literal(s)))
        }
        "tags" => Some(format!("'{}' = ANY(tags)", escape_literal(s))),
        _ => None,
    }
}

/// Set-membership counterpart to `equals_clause`, mirroring the in-memory
/// adapter's `any_of` semantics: `category`/`classification_level` match if
/// the column equals any candidate value, `tags` matches if the record's tag
/// array overlaps the candidate set.
fn any_of_clause(key: &str, values: &[serde_json::Value], has_classification: bool) -> Option<String> {
    let literals: Vec<String> = values
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| format!("'{}'", escape_literal(s)))
        .collect();
    if literals.is_empty() {
        return None;
    }
    match key {
        "category" => Some(format!("category IN ({})", literals.join(","))),
        "classification_level" if has_classification => {
            Some(format!("classification_level IN ({})", literals.join(",")))
        }
        "tags" => Some(format!("tags && ARRAY[{}]::text[]", literals.join(","))),
        _ => None,
    }
}

/// Pushes every recognized `equals`/`any_of` constraint onto `sql` as an
/// `AND` clause (§4.3: the adapter pushes filters down, the engine never
/// re-filters for attributes). `has_classification` selects the documents
/// vs. knowledge-items column set.
fn push_filter_clauses(sql: &mut String, filters: &Filters, has_classification: bool) {
    for (key, value) in &filters.equals {
        if let Some(clause) = equals_clause(key, value, has_classification) {
            sql.push_str(" AND ");
            sql.push_str(&clause);
        }
    }
    for (key, values) in &filters.any_of {
        if let Some(clause) = any_of_clause(key, values, has_classification) {
            sql.push_str(" AND ");
            sql.push_str(&clause);
        }
    }
}
