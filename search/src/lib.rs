//! Similarity Search Engine (§4.5).

pub mod engine;

pub use engine::{Scope, SearchOptions, SimilaritySearchEngine};
