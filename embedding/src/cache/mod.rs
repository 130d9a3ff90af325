//! Embedding Cache implementations (§4.2).

pub mod memory;
pub mod redis;

pub use memory::MemoryEmbeddingCache;
pub use redis::RedisEmbeddingCache;
