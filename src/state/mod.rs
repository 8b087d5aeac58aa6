//! State module for tracking discovery progress
//!
//! # Components
//!
//! - `DiscoveryCheckpoint` / `CheckpointStore`: persisted cursor and partial
//!   results that let a long fan-out crawl resume after an interruption
//! - `RunSummary`: per-item outcomes collected during a run and logged at
//!   the end

mod checkpoint;
mod summary;

// Re-export main types
pub use checkpoint::{parents_digest, CheckpointError, CheckpointStore, DiscoveryCheckpoint};
pub use summary::{ItemOutcome, RunSummary};
