//! Embedding Provider Client implementations (§4.1).

pub mod http;
pub mod mock;

pub use http::HttpEmbeddingProvider;
pub use mock::MockEmbeddingProvider;
