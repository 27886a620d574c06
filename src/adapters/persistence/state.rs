//! Snapshot Store - Atomic JSON Engine State Persistence
//!
//! Saves engine snapshots to `state.json` using atomic writes (write to
//! tmp file, then rename). The file is always either the old or the new
//! version, never a partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, instrument};

use crate::ports::repository::EngineSnapshot;

/// Atomic JSON snapshot store for crash forensics.
pub struct SnapshotStore {
    /// Path to state.json.
    state_path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl SnapshotStore {
    /// Create a new snapshot store in the given data directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            state_path: dir.join("state.json"),
            tmp_path: dir.join("state.json.tmp"),
        })
    }

    /// Save a snapshot atomically (tmp then rename).
    #[instrument(skip(self, snapshot))]
    pub async fn save(&self, snapshot: &EngineSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize engine snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp state file")?;

        fs::rename(&self.tmp_path, &self.state_path)
            .await
            .context("Failed to rename state file")?;

        info!(
            path = %self.state_path.display(),
            capital = snapshot.capital,
            "Engine snapshot saved"
        );

        Ok(())
    }

    /// Load the most recent snapshot.
    ///
    /// Returns `None` if no state file exists (first startup).
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<EngineSnapshot>> {
        if !self.state_path.exists() {
            info!("No state file found, starting fresh");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.state_path)
            .await
            .context("Failed to read state file")?;

        let snapshot: EngineSnapshot =
            serde_json::from_str(&json).context("Failed to parse state JSON")?;

        info!(
            capital = snapshot.capital,
            positions = snapshot.positions.len(),
            "Engine snapshot loaded"
        );

        Ok(Some(snapshot))
    }

    /// Check if the data directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let test_path = self.tmp_path.with_file_name(".health_check");
        let result = fs::write(&test_path, b"ok").await;
        let _ = fs::remove_file(&test_path).await;
        result.is_ok()
    }
}
