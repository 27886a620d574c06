//! Repository Port - State Persistence Interface
//!
//! Defines traits for persisting engine decisions using JSONL files.
//! No database dependency - lightweight append-only log format
//! optimized for audit trails and crash recovery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::types::MarketId;

/// A single decision record (entry or exit) for persistence and auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
  /// Unique decision identifier.
  pub id: String,
  /// Market the decision concerns.
  pub market_id: MarketId,
  /// "entry" or "exit".
  pub kind: String,
  /// Side traded (YES/NO).
  pub side: String,
  /// Strategy that produced the signal (entries only).
  pub strategy: Option<String>,
  /// Exit reason label (exits only).
  pub exit_reason: Option<String>,
  /// Execution price.
  pub price: f64,
  /// Notional in USDC.
  pub size_usd: f64,
  /// Cost-adjusted edge at decision time (entries only).
  pub adjusted_edge: Option<f64>,
  /// Kelly fraction used for sizing (entries only).
  pub kelly_fraction: Option<f64>,
  /// Realized PnL (exits only).
  pub realized_pnl: Option<f64>,
  /// Timestamp (Unix ms).
  pub timestamp_ms: u64,
}

/// Engine state snapshot for crash recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
  /// Version of the state format.
  pub version: String,
  /// Timestamp of snapshot (Unix ms).
  pub timestamp_ms: u64,
  /// Current capital in USDC.
  pub capital: f64,
  /// Peak capital seen.
  pub peak_capital: f64,
  /// Open positions as (market_id, side, entry_price, size_usd).
  pub positions: Vec<(String, String, f64, f64)>,
  /// Whether the kill switch was active.
  pub kill_switch_active: bool,
  /// Total decision cycles completed.
  pub cycles_completed: u64,
}

/// Trait for state persistence providers.
///
/// Uses JSONL (JSON Lines) format for append-only logging. Each line is a
/// self-contained JSON record, making it easy to parse, stream, and
/// recover from partial writes.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
  /// Append a decision record to the log.
  async fn save_decision(&self, record: &DecisionRecord) -> anyhow::Result<()>;

  /// Load all decision records (for recovery/analysis).
  async fn load_decisions(&self) -> anyhow::Result<Vec<DecisionRecord>>;

  /// Save an engine state snapshot (for crash recovery).
  async fn save_snapshot(&self, snapshot: &EngineSnapshot) -> anyhow::Result<()>;

  /// Load the most recent engine snapshot.
  async fn load_latest_snapshot(&self) -> anyhow::Result<Option<EngineSnapshot>>;

  /// Check if the repository is healthy (disk space, permissions).
  async fn is_healthy(&self) -> bool;
}
