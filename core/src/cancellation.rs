//! Cooperative cancellation (§5, §9 "coroutine-style cancellation").
//!
//! Cancellation is threaded explicitly through every long-running call
//! rather than relied upon via thread interruption. `CancellationToken` is
//! cheap to clone and share across workers; every sleep and every provider
//! call in this crate selects against it.

pub use tokio_util::sync::CancellationToken;
