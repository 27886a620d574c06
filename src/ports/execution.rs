//! Order Execution Port - Exchange Order Interface
//!
//! Defines the trait for placing entries and closing positions. The core
//! never assumes an order succeeded until told so, and treats "order
//! failed" as a recoverable outcome — retry policy belongs to the
//! implementor, not the engine.

use async_trait::async_trait;

use crate::domain::types::{EntrySignal, ExitReason, MarketId, Side};

/// Result of an entry placement attempt.
#[derive(Debug, Clone)]
pub struct EntryFill {
  /// Whether the order was accepted and filled.
  pub accepted: bool,
  /// Filled notional in USDC (0 when rejected).
  pub filled_size_usd: f64,
  /// Average fill price.
  pub fill_price: f64,
  /// Rejection reason if not accepted (price drift, no liquidity, ...).
  pub rejection_reason: Option<String>,
  /// Execution timestamp (Unix ms).
  pub timestamp_ms: u64,
}

/// Result of a close (full or partial) attempt.
#[derive(Debug, Clone)]
pub struct CloseFill {
  /// Whether the close succeeded.
  pub accepted: bool,
  /// Closed notional in USDC.
  pub closed_size_usd: f64,
  /// Average close price.
  pub close_price: f64,
  /// Realized PnL on the closed portion.
  pub realized_pnl: f64,
  /// Rejection reason if not accepted.
  pub rejection_reason: Option<String>,
  /// Execution timestamp (Unix ms).
  pub timestamp_ms: u64,
}

/// Trait for order execution providers.
///
/// Implementors connect to the exchange and handle order lifecycle.
/// A failed placement is an expected, recoverable outcome: the engine
/// records the reason and moves on to the next candidate.
#[async_trait]
pub trait OrderExecution: Send + Sync + 'static {
  /// Place an entry order per the optimizer's plan.
  ///
  /// # Errors
  /// Returns an error only for transport-level failures; an exchange
  /// rejection comes back as `EntryFill { accepted: false, .. }`.
  async fn place_entry(&self, signal: &EntrySignal) -> anyhow::Result<EntryFill>;

  /// Close part or all of an open position.
  async fn close_position(
    &self,
    market_id: &MarketId,
    side: Side,
    size_usd: f64,
    reason: ExitReason,
  ) -> anyhow::Result<CloseFill>;

  /// Check if the execution connection is healthy.
  async fn is_healthy(&self) -> bool;
}
