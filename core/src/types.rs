//! Domain types shared by every layer of the embedding engine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A fixed-dimension real-valued embedding vector.
///
/// Dimension is not encoded in the type (it is a deployment-time invariant,
/// not a compile-time one — see §4.1) but every call site that compares two
/// vectors must check `dimension()` equality first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector(pub Vec<f32>);

impl Vector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for Vector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Deterministic digest of the exact text sent to the embedding provider.
///
/// Two identical input texts produce the same fingerprint; used as the
/// embedding cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextFingerprint(String);

impl TextFingerprint {
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache namespace key per §6: `embedding:<hex-of-text-fingerprint>`.
    pub fn cache_key(&self) -> String {
        format!("embedding:{}", self.0)
    }
}

/// A cached embedding, keyed by fingerprint, with an expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: TextFingerprint,
    pub vector: Vector,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Document processing state (§3). A vector is only generated/used when
/// `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A user-uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub body: String,
    pub state: ProcessingState,
    pub vector: Option<Vector>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub classification_level: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A curated knowledge item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub active: bool,
    pub confidence: f32,
    pub vector: Option<Vector>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl KnowledgeItem {
    /// Canonical text for embedding (§4.4): order and separators are
    /// load-bearing for fingerprint stability — do not change without
    /// accepting a cache/fingerprint invalidation across the fleet.
    pub fn canonical_text(&self) -> String {
        match &self.summary {
            Some(summary) if !summary.is_empty() => {
                format!("{}\n{}\n{}", self.title, self.content, summary)
            }
            _ => format!("{}\n{}", self.title, self.content),
        }
    }
}

/// Which record kind a search result, or a search scope, refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Document,
    Knowledge,
}

/// Attribute constraints pushed down to the store adapter (§4.3). Each entry
/// is an equality or set-membership constraint over a record field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filters {
    pub equals: HashMap<String, serde_json::Value>,
    pub any_of: HashMap<String, Vec<serde_json::Value>>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.any_of.is_empty()
    }
}

/// Read-only projection of a record's attributes attached to a search hit.
/// A `SearchHit` is a view — it does not own the record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub title: Option<String>,
    pub classification_level: Option<String>,
}

/// A ranked semantic search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub kind: RecordKind,
    pub id: String,
    pub score: f32,
    pub projection: Projection,
}

/// Aggregated outcome of a back-fill pipeline run (§4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub duration: std::time::Duration,
    pub cancelled: bool,
}

impl PipelineReport {
    pub fn merge(&mut self, other: PipelineReport) {
        self.total_processed += other.total_processed;
        self.successful += other.successful;
        self.failed += other.failed;
        self.errors.extend(other.errors);
        self.duration += other.duration;
        self.cancelled = self.cancelled || other.cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = TextFingerprint::of("hello world");
        let b = TextFingerprint::of("hello world");
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), format!("embedding:{}", a.as_str()));
    }

    #[test]
    fn fingerprint_differs_on_different_text() {
        assert_ne!(TextFingerprint::of("a"), TextFingerprint::of("b"));
    }

    #[test]
    fn knowledge_canonical_text_includes_summary_when_present() {
        let item = KnowledgeItem {
            id: "k1".into(),
            title: "Title".into(),
            content: "Content".into(),
            summary: Some("Summary".into()),
            category: None,
            tags: vec![],
            active: true,
            confidence: 1.0,
            vector: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        assert_eq!(item.canonical_text(), "Title\nContent\nSummary");
    }

    #[test]
    fn knowledge_canonical_text_omits_empty_summary() {
        let item = KnowledgeItem {
            id: "k1".into(),
            title: "Title".into(),
            content: "Content".into(),
            summary: None,
            category: None,
            tags: vec![],
            active: true,
            confidence: 1.0,
            vector: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        assert_eq!(item.canonical_text(), "Title\nContent");
    }

    #[test]
    fn pipeline_report_merge_sums_fields() {
        let mut a = PipelineReport {
            total_processed: 5,
            successful: 4,
            failed: 1,
            errors: vec!["e1".into()],
            duration: std::time::Duration::from_secs(1),
            cancelled: false,
        };
        let b = PipelineReport {
            total_processed: 3,
            successful: 3,
            failed: 0,
            errors: vec![],
            duration: std::time::Duration::from_secs(2),
            cancelled: true,
        };
        a.merge(b);
        assert_eq!(a.total_processed, 8);
        assert_eq!(a.successful, 7);
        assert_eq!(a.failed, 1);
        assert_eq!(a.errors.len(), 1);
        assert_eq!(a.duration, std::time::Duration::from_secs(3));
        assert!(a.cancelled);
    }
}
