//! Market State Store - Per-market Time Series Substrate
//!
//! In-memory store of price samples and forecast snapshots, keyed by
//! market id, with a token-id index for O(1) routing of price ticks.
//! Every other component reads from here.
//!
//! Policies:
//! - Price points are pruned to the retention window via binary search on
//!   the sorted timestamp sequence (`partition_point`), not O(n) filtering.
//! - Velocity (price change per second over the trailing minute) is
//!   recomputed on EVERY update. The every-5th-update variant was rejected:
//!   a uniform policy keeps volatility-regime classification deterministic
//!   with respect to the tick stream.
//! - Ticks older than the latest stored timestamp for a token are ignored.
//! - Forecast snapshots strictly replace the prior one; older arrivals are
//!   rejected. The first observation never registers as a change.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::types::{
  ForecastSnapshot, MarketId, ParsedWeatherMarket, PricePoint, Side, TokenId,
};

/// Bounded price series for one market side, with a velocity statistic.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
  points: Vec<PricePoint>,
  velocity_per_sec: f64,
}

impl PriceHistory {
  /// Append a point, prune the window, recompute velocity.
  ///
  /// Returns false when the point is older than the latest stored
  /// timestamp (duplicate/out-of-order tick).
  fn push(&mut self, price: f64, timestamp_ms: u64, retention_ms: u64, velocity_window_ms: u64) -> bool {
    if let Some(last) = self.points.last() {
      if timestamp_ms < last.timestamp_ms {
        return false;
      }
    }

    self.points.push(PricePoint { price, timestamp_ms });

    // O(log n) search for the retention cutoff; everything before it goes.
    let min_ts = timestamp_ms.saturating_sub(retention_ms);
    let cut = self.points.partition_point(|p| p.timestamp_ms < min_ts);
    if cut > 0 {
      self.points.drain(..cut);
    }

    self.recompute_velocity(timestamp_ms, velocity_window_ms);
    true
  }

  /// Price change per second over the trailing window.
  fn recompute_velocity(&mut self, now_ms: u64, window_ms: u64) {
    let min_ts = now_ms.saturating_sub(window_ms);
    let start = self.points.partition_point(|p| p.timestamp_ms < min_ts);
    let window = &self.points[start..];

    self.velocity_per_sec = match (window.first(), window.last()) {
      (Some(first), Some(last)) if last.timestamp_ms > first.timestamp_ms => {
        let dt_secs = (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.0;
        (last.price - first.price) / dt_secs
      }
      _ => 0.0,
    };
  }

  /// Latest observed price, if any tick has arrived.
  pub fn last_price(&self) -> Option<f64> {
    self.points.last().map(|p| p.price)
  }

  /// All retained points, in timestamp order.
  pub fn points(&self) -> &[PricePoint] {
    &self.points
  }

  /// Current velocity statistic (price change per second).
  pub fn velocity_per_sec(&self) -> f64 {
    self.velocity_per_sec
  }
}

/// All tracked state for one market.
#[derive(Debug, Clone)]
pub struct MarketState {
  /// Registration metadata.
  pub market: ParsedWeatherMarket,
  /// YES side price series.
  pub yes: PriceHistory,
  /// NO side price series.
  pub no: PriceHistory,
  /// Most recent forecast snapshot.
  pub last_forecast: Option<ForecastSnapshot>,
  /// Bounded forecast history (24 h window).
  pub forecast_history: Vec<ForecastSnapshot>,
}

impl MarketState {
  /// Series for the given side.
  pub fn history(&self, side: Side) -> &PriceHistory {
    match side {
      Side::Yes => &self.yes,
      Side::No => &self.no,
    }
  }

  /// Latest price for a side, falling back to the registration price.
  pub fn price(&self, side: Side) -> f64 {
    match side {
      Side::Yes => self.yes.last_price().unwrap_or(self.market.price_yes),
      Side::No => self.no.last_price().unwrap_or(self.market.price_no),
    }
  }
}

/// In-memory store of per-market time series, the substrate every
/// decision component reads.
pub struct MarketStateStore {
  markets: HashMap<MarketId, MarketState>,
  /// token id -> (owning market, side) for O(1) tick routing.
  token_index: HashMap<TokenId, (MarketId, Side)>,
  price_retention_ms: u64,
  velocity_window_ms: u64,
  forecast_retention_ms: u64,
  /// Forecast move (metric units) that counts as a significant change.
  significance_threshold: f64,
}

impl MarketStateStore {
  /// Create an empty store with the given retention windows.
  pub fn new(
    price_retention_ms: u64,
    velocity_window_ms: u64,
    forecast_retention_ms: u64,
    significance_threshold: f64,
  ) -> Self {
    Self {
      markets: HashMap::new(),
      token_index: HashMap::new(),
      price_retention_ms,
      velocity_window_ms,
      forecast_retention_ms,
      significance_threshold,
    }
  }

  /// Register a market. Idempotent: a no-op if already tracked.
  pub fn register_market(&mut self, market: ParsedWeatherMarket) {
    if self.markets.contains_key(&market.market_id) {
      debug!(market = %market.market_id, "Market already tracked, skipping");
      return;
    }

    self
      .token_index
      .insert(market.yes_token_id.clone(), (market.market_id.clone(), Side::Yes));
    self
      .token_index
      .insert(market.no_token_id.clone(), (market.market_id.clone(), Side::No));

    debug!(market = %market.market_id, event = %market.event_key, "Market registered");

    self.markets.insert(
      market.market_id.clone(),
      MarketState {
        market,
        yes: PriceHistory::default(),
        no: PriceHistory::default(),
        last_forecast: None,
        forecast_history: Vec::new(),
      },
    );
  }

  /// Apply a price tick, routing by token id.
  ///
  /// Returns true when the tick was applied; false for unknown tokens,
  /// out-of-range prices, and stale ticks.
  pub fn update_price(&mut self, token_id: &TokenId, price: f64, timestamp_ms: u64) -> bool {
    if !(price > 0.0 && price < 1.0) {
      debug!(token = %token_id, price, "Ignoring out-of-range price");
      return false;
    }

    let Some((market_id, side)) = self.token_index.get(token_id).cloned() else {
      debug!(token = %token_id, "Tick for unknown token ignored");
      return false;
    };

    let Some(state) = self.markets.get_mut(&market_id) else {
      return false;
    };

    let history = match side {
      Side::Yes => &mut state.yes,
      Side::No => &mut state.no,
    };
    history.push(price, timestamp_ms, self.price_retention_ms, self.velocity_window_ms)
  }

  /// Apply a forecast observation, building the snapshot.
  ///
  /// Returns the stored snapshot, or `None` for unknown markets and
  /// out-of-order arrivals (older than the currently stored snapshot).
  pub fn update_forecast(
    &mut self,
    market_id: &MarketId,
    forecast_value: f64,
    probability: f64,
    sigma: Option<f64>,
    timestamp_ms: u64,
  ) -> Option<ForecastSnapshot> {
    let significance = self.significance_threshold;
    let retention_ms = self.forecast_retention_ms;
    let state = self.markets.get_mut(market_id)?;

    if let Some(last) = &state.last_forecast {
      if timestamp_ms < last.change_timestamp_ms {
        warn!(
          market = %market_id,
          incoming = timestamp_ms,
          stored = last.change_timestamp_ms,
          "Rejecting out-of-order forecast snapshot"
        );
        return None;
      }
    }

    let is_initial = state.last_forecast.is_none() && state.forecast_history.is_empty();
    let previous_value = state.last_forecast.as_ref().map(|f| f.forecast_value);
    let change_amount = previous_value.map_or(0.0, |prev| forecast_value - prev);
    // First observation must never register as a change.
    let value_changed = !is_initial && change_amount.abs() >= significance;

    let snapshot = ForecastSnapshot {
      market_id: market_id.clone(),
      forecast_value,
      probability,
      previous_value,
      value_changed,
      change_amount,
      change_timestamp_ms: timestamp_ms,
      threshold_position: Some(forecast_value - state.market.threshold),
      sigma,
      is_initial,
    };

    state.last_forecast = Some(snapshot.clone());
    state.forecast_history.push(snapshot.clone());

    let min_ts = timestamp_ms.saturating_sub(retention_ms);
    let cut = state
      .forecast_history
      .partition_point(|f| f.change_timestamp_ms < min_ts);
    if cut > 0 {
      state.forecast_history.drain(..cut);
    }

    Some(snapshot)
  }

  /// Read-only access to one market's state.
  pub fn market(&self, market_id: &MarketId) -> Option<&MarketState> {
    self.markets.get(market_id)
  }

  /// Which market/side a token belongs to.
  pub fn resolve_token(&self, token_id: &TokenId) -> Option<&(MarketId, Side)> {
    self.token_index.get(token_id)
  }

  /// All tracked market ids.
  pub fn market_ids(&self) -> impl Iterator<Item = &MarketId> {
    self.markets.keys()
  }

  /// Iterate all market states.
  pub fn markets(&self) -> impl Iterator<Item = &MarketState> {
    self.markets.values()
  }

  /// Number of tracked markets.
  pub fn len(&self) -> usize {
    self.markets.len()
  }

  /// Whether no markets are tracked.
  pub fn is_empty(&self) -> bool {
    self.markets.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::types::ComparisonType;
  use chrono::Utc;

  fn test_market(id: &str) -> ParsedWeatherMarket {
    ParsedWeatherMarket {
      market_id: id.to_string(),
      question: format!("test market {id}"),
      yes_token_id: format!("{id}-yes"),
      no_token_id: format!("{id}-no"),
      threshold: 90.0,
      comparison: ComparisonType::Above,
      event_key: "nyc".to_string(),
      target_date: Utc::now(),
      price_yes: 0.5,
      price_no: 0.5,
    }
  }

  fn test_store() -> MarketStateStore {
    MarketStateStore::new(600_000, 60_000, 86_400_000, 1.0)
  }

  #[test]
  fn test_register_is_idempotent() {
    let mut store = test_store();
    store.register_market(test_market("m1"));
    store.register_market(test_market("m1"));
    assert_eq!(store.len(), 1);
  }

  #[test]
  fn test_price_routing_by_token() {
    let mut store = test_store();
    store.register_market(test_market("m1"));

    assert!(store.update_price(&"m1-yes".to_string(), 0.6, 1_000));
    assert!(store.update_price(&"m1-no".to_string(), 0.4, 1_000));

    let state = store.market(&"m1".to_string()).unwrap();
    assert_eq!(state.price(Side::Yes), 0.6);
    assert_eq!(state.price(Side::No), 0.4);
  }

  #[test]
  fn test_unknown_token_ignored() {
    let mut store = test_store();
    store.register_market(test_market("m1"));
    assert!(!store.update_price(&"nope".to_string(), 0.5, 1_000));
  }

  #[test]
  fn test_out_of_range_price_ignored() {
    let mut store = test_store();
    store.register_market(test_market("m1"));
    assert!(!store.update_price(&"m1-yes".to_string(), 0.0, 1_000));
    assert!(!store.update_price(&"m1-yes".to_string(), 1.0, 1_000));
    assert!(!store.update_price(&"m1-yes".to_string(), -0.3, 1_000));
  }

  #[test]
  fn test_stale_tick_ignored() {
    let mut store = test_store();
    store.register_market(test_market("m1"));
    let tok = "m1-yes".to_string();
    assert!(store.update_price(&tok, 0.5, 2_000));
    assert!(!store.update_price(&tok, 0.6, 1_000));
    let state = store.market(&"m1".to_string()).unwrap();
    assert_eq!(state.price(Side::Yes), 0.5);
  }

  #[test]
  fn test_pruning_keeps_exactly_window() {
    let mut store = MarketStateStore::new(10_000, 60_000, 86_400_000, 1.0);
    store.register_market(test_market("m1"));
    let tok = "m1-yes".to_string();

    for i in 0..30u64 {
      store.update_price(&tok, 0.5, i * 1_000);
    }

    let points = store.market(&"m1".to_string()).unwrap().yes.points();
    // Last tick at 29s, retention 10s -> points at 19s..=29s survive.
    assert_eq!(points.first().unwrap().timestamp_ms, 19_000);
    assert_eq!(points.last().unwrap().timestamp_ms, 29_000);
    assert!(points.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
  }

  #[test]
  fn test_velocity_over_trailing_window() {
    let mut store = test_store();
    store.register_market(test_market("m1"));
    let tok = "m1-yes".to_string();

    // 10 cent move over 10 seconds -> 0.01/sec.
    store.update_price(&tok, 0.50, 0);
    store.update_price(&tok, 0.55, 5_000);
    store.update_price(&tok, 0.60, 10_000);

    let v = store.market(&"m1".to_string()).unwrap().yes.velocity_per_sec();
    assert!((v - 0.01).abs() < 1e-9, "velocity {v}");
  }

  #[test]
  fn test_first_forecast_is_initial_not_change() {
    let mut store = test_store();
    store.register_market(test_market("m1"));

    let snap = store
      .update_forecast(&"m1".to_string(), 92.0, 0.7, Some(2.5), 1_000)
      .unwrap();
    assert!(snap.is_initial);
    assert!(!snap.value_changed);
    assert_eq!(snap.change_amount, 0.0);
    assert_eq!(snap.previous_value, None);
    assert_eq!(snap.threshold_position, Some(2.0));
  }

  #[test]
  fn test_significant_forecast_change() {
    let mut store = test_store();
    store.register_market(test_market("m1"));
    let id = "m1".to_string();

    store.update_forecast(&id, 92.0, 0.7, None, 1_000);
    let small = store.update_forecast(&id, 92.5, 0.72, None, 2_000).unwrap();
    assert!(!small.value_changed, "sub-threshold move is not a change");

    let big = store.update_forecast(&id, 94.0, 0.8, None, 3_000).unwrap();
    assert!(big.value_changed);
    assert!((big.change_amount - 1.5).abs() < 1e-9);
  }

  #[test]
  fn test_out_of_order_forecast_rejected() {
    let mut store = test_store();
    store.register_market(test_market("m1"));
    let id = "m1".to_string();

    store.update_forecast(&id, 92.0, 0.7, None, 5_000);
    assert!(store.update_forecast(&id, 90.0, 0.6, None, 4_000).is_none());

    let last = store.market(&id).unwrap().last_forecast.as_ref().unwrap();
    assert_eq!(last.forecast_value, 92.0);
  }

  #[test]
  fn test_forecast_history_bounded() {
    let mut store = MarketStateStore::new(600_000, 60_000, 10_000, 1.0);
    store.register_market(test_market("m1"));
    let id = "m1".to_string();

    for i in 0..10u64 {
      store.update_forecast(&id, 90.0 + i as f64, 0.5, None, i * 5_000);
    }

    let history = &store.market(&id).unwrap().forecast_history;
    // Last at 45s, retention 10s -> only 35s..=45s survive.
    assert!(history.iter().all(|f| f.change_timestamp_ms >= 35_000));
    assert!(!history.is_empty());
  }
}
