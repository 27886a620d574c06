//! Forecast Feed Port - Weather Model Update Interface
//!
//! Forecast updates arrive asynchronously at irregular intervals. The core
//! treats a missing or stale forecast as "no signal", never as zero
//! probability. Provider polling and binary-file ingestion live entirely
//! behind this trait.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::types::MarketId;

/// One forecast observation for a market, as delivered by the provider.
#[derive(Debug, Clone)]
pub struct ForecastUpdate {
  /// Market this forecast applies to.
  pub market_id: MarketId,
  /// Raw forecast value in metric units (e.g. degrees).
  pub forecast_value: f64,
  /// Model-implied probability of the YES outcome.
  pub probability: f64,
  /// Standard deviations between forecast and threshold, if the provider
  /// reports an ensemble spread.
  pub sigma: Option<f64>,
  /// Observation timestamp (Unix ms).
  pub timestamp_ms: u64,
}

/// Trait for forecast providers.
#[async_trait]
pub trait ForecastFeed: Send + Sync + 'static {
  /// Subscribe to forecast updates for all registered markets.
  fn subscribe(&self) -> broadcast::Receiver<ForecastUpdate>;

  /// Check if the provider connection is healthy.
  async fn is_healthy(&self) -> bool;
}
