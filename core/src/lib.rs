//! # Embedding Core
//!
//! Shared types, traits, and configuration for the semantic embedding and
//! vector-search engine.
//!
//! This crate provides:
//! - Domain types for documents, knowledge items, vectors, and search hits
//! - Trait seams implemented by the `embedding`, `store`, `search`, and
//!   `pipeline` crates (`EmbeddingProvider`, `EmbeddingCacheBackend`,
//!   `EmbeddingStore`)
//! - A single crate-wide error taxonomy (`EmbeddingError`)
//! - A layered configuration surface (`Settings`)

pub mod cancellation;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use cancellation::CancellationToken;
pub use error::EmbeddingError;
pub use types::{
    CacheEntry, Document, Filters, KnowledgeItem, PipelineReport, ProcessingState, Projection,
    RecordKind, SearchHit, TextFingerprint, Vector,
};
