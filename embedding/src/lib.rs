//! Provider client, cache, and the orchestrating embedding service (§4.1,
//! §4.2, §4.4).

pub mod cache;
pub mod provider;
pub mod service;

pub use service::EmbeddingService;
