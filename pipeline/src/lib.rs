//! Back-fill Pipeline (§4.6): drives the Embedding Service over every
//! record missing a vector, under bounded concurrency, with per-item retry
//! and cooperative cancellation.

pub mod backfill;

pub use backfill::{BackfillConfig, BackfillPipeline, RecordOp};
