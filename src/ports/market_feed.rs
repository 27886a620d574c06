//! Market Feed Port - Real-time Price Data Interface
//!
//! Defines the trait for receiving live price ticks from the exchange
//! transport. The core is robust to duplicate or slightly out-of-order
//! ticks: the market store ignores anything older than the latest stored
//! timestamp for a token.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::types::TokenId;

/// One price tick for a single outcome token.
#[derive(Debug, Clone)]
pub struct PriceTick {
  /// Token the tick is for.
  pub token_id: TokenId,
  /// Price in (0, 1).
  pub price: f64,
  /// Tick timestamp (Unix ms).
  pub timestamp_ms: u64,
}

/// Order book depth snapshot for a single token.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
  /// Token identifier.
  pub token_id: TokenId,
  /// Bid levels sorted by price descending: (price, size).
  pub bids: Vec<(f64, f64)>,
  /// Ask levels sorted by price ascending: (price, size).
  pub asks: Vec<(f64, f64)>,
  /// Snapshot timestamp (Unix ms).
  pub timestamp_ms: u64,
}

impl BookSnapshot {
  /// Best bid price, if any depth exists.
  pub fn best_bid(&self) -> Option<f64> {
    self.bids.first().map(|(p, _)| *p)
  }

  /// Best ask price, if any depth exists.
  pub fn best_ask(&self) -> Option<f64> {
    self.asks.first().map(|(p, _)| *p)
  }

  /// Spread between best ask and best bid.
  pub fn spread(&self) -> Option<f64> {
    match (self.best_bid(), self.best_ask()) {
      (Some(bid), Some(ask)) => Some(ask - bid),
      _ => None,
    }
  }

  /// Total size resting on the top ask levels (entry-relevant depth).
  pub fn ask_depth(&self) -> f64 {
    self.asks.iter().map(|(_, s)| s).sum()
  }
}

/// Trait for market data feed providers.
///
/// Implementors connect to real-time data sources (WebSocket, polling)
/// and emit ticks via a broadcast channel. The hexagonal architecture
/// ensures the core never depends on transport details.
#[async_trait]
pub trait MarketFeed: Send + Sync + 'static {
  /// Subscribe to the tick stream covering all registered tokens.
  fn subscribe(&self) -> broadcast::Receiver<PriceTick>;

  /// Get the current order book snapshot for a token.
  ///
  /// Returns `None` when no book is available; sizing then falls back
  /// to a neutral depth score.
  async fn order_book(&self, token_id: &TokenId) -> anyhow::Result<Option<BookSnapshot>>;

  /// Check if the feed connection is healthy.
  async fn is_healthy(&self) -> bool;
}
