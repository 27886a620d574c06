//! Repository Implementation — Concrete Adapter for the Repository Port
//!
//! Wraps `SnapshotStore` (atomic JSON snapshots) and `DecisionLogger`
//! (JSONL append-only files) into a single struct that implements the
//! `Repository` trait from `crate::ports::repository`.
//!
//! This is the hexagonal architecture glue: the usecases layer only
//! knows about the `Repository` trait, never about files or JSON.

use anyhow::Result;
use async_trait::async_trait;

use super::decisions::DecisionLogger;
use super::state::SnapshotStore;
use crate::ports::repository::{DecisionRecord, EngineSnapshot, Repository};

/// Concrete repository adapter combining snapshot and decision persistence.
pub struct FileRepository {
    /// Atomic JSON snapshot store.
    snapshots: SnapshotStore,
    /// JSONL decision logger.
    decisions: DecisionLogger,
}

impl FileRepository {
    /// Create a new repository with a data directory path.
    ///
    /// Initializes both the snapshot store and the decision logger in
    /// the given directory, creating subdirectories as needed.
    pub async fn from_data_dir(data_dir: &str) -> Result<Self> {
        let snapshots = SnapshotStore::new(data_dir).await?;
        let decisions = DecisionLogger::new(data_dir).await?;
        Ok(Self { snapshots, decisions })
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save_decision(&self, record: &DecisionRecord) -> Result<()> {
        self.decisions.append(record).await
    }

    async fn load_decisions(&self) -> Result<Vec<DecisionRecord>> {
        self.decisions.load_all().await
    }

    async fn save_snapshot(&self, snapshot: &EngineSnapshot) -> Result<()> {
        self.snapshots.save(snapshot).await
    }

    async fn load_latest_snapshot(&self) -> Result<Option<EngineSnapshot>> {
        self.snapshots.load().await
    }

    async fn is_healthy(&self) -> bool {
        self.snapshots.is_healthy().await && self.decisions.is_healthy().await
    }
}
