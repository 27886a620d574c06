//! Decision Logger - Append-only JSONL Decision Records
//!
//! Persists every entry and exit decision to daily JSONL files in the
//! format `decisions/YYYY-MM-DD.jsonl`. Each line is a self-contained
//! JSON record for easy parsing, streaming, and post-hoc analysis.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::ports::repository::DecisionRecord;

/// Append-only JSONL decision logger with daily file rotation.
///
/// Decision files are named `decisions/YYYY-MM-DD.jsonl` and each line
/// is a complete JSON object. This format is optimized for:
/// - Append-only writes (no read-modify-write)
/// - Line-by-line streaming for analysis
/// - Natural daily partitioning
pub struct DecisionLogger {
    /// Base directory for decision files.
    decisions_dir: PathBuf,
}

impl DecisionLogger {
    /// Create a new decision logger in the given data directory.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let decisions_dir = Path::new(data_dir).join("decisions");

        fs::create_dir_all(&decisions_dir)
            .await
            .context("Failed to create decisions directory")?;

        Ok(Self { decisions_dir })
    }

    /// Append a decision record to today's JSONL file.
    #[instrument(skip(self, record), fields(decision_id = %record.id))]
    pub async fn append(&self, record: &DecisionRecord) -> Result<()> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let path = self.decisions_dir.join(format!("{date}.jsonl"));

        let mut json = serde_json::to_string(record)
            .context("Failed to serialize decision record")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open decision log file")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write decision record")?;

        file.flush().await.context("Failed to flush decision log")?;

        Ok(())
    }

    /// Load all decision records from all daily files.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<DecisionRecord>> {
        let mut decisions = Vec::new();
        let mut entries = fs::read_dir(&self.decisions_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                let content = fs::read_to_string(&path).await?;
                for line in content.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<DecisionRecord>(line) {
                        Ok(record) => decisions.push(record),
                        Err(e) => {
                            warn!(
                                file = %path.display(),
                                error = %e,
                                "Skipping malformed decision record"
                            );
                        }
                    }
                }
            }
        }

        decisions.sort_by_key(|d| d.timestamp_ms);
        info!(count = decisions.len(), "Loaded decision records");
        Ok(decisions)
    }

    /// Check if the decisions directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let test_path = self.decisions_dir.join(".health_check");
        let result = fs::write(&test_path, b"ok").await;
        let _ = fs::remove_file(&test_path).await;
        result.is_ok()
    }
}
