//! Persistence Adapters - JSONL Logs and Atomic Snapshots
//!
//! File-based persistence with no database dependency:
//! - `decisions`: append-only JSONL decision records, daily rotation
//! - `state`: atomic JSON engine snapshots (tmp + rename)
//! - `repository_impl`: the combined `Repository` port implementation

pub mod decisions;
pub mod repository_impl;
pub mod state;

pub use decisions::DecisionLogger;
pub use repository_impl::FileRepository;
pub use state::SnapshotStore;
