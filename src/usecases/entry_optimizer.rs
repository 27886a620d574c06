//! Entry Optimizer - Edge to Executable Order Plan
//!
//! Turns a calculated edge into a sized order plan:
//! - Liquidity sizing from the order book (depth score + spread penalty);
//!   wide spreads or shallow books strictly reduce size, never increase it.
//! - Volatility sizing from the regime classifier; higher regimes shrink
//!   the multiplier.
//! - Urgency decay: exponential in the age of the triggering forecast
//!   change (floor 0.1). High urgency buys at market; decayed urgency
//!   rests a limit order.
//! - Scale-in: plans above the notional threshold split into tranches
//!   with increasing delays.
//!
//! A size of 0 is a valid "do not trade" outcome, not an error.

use tracing::debug;

use crate::config::EntryConfig;
use crate::domain::costs::CostModel;
use crate::domain::types::{
  CalculatedEdge, EntrySignal, OrderType, ScaleInTranche, Urgency, VolatilityRegime,
};
use crate::ports::market_feed::BookSnapshot;

/// Smallest notional worth sending to the exchange.
const MIN_TRADE_USD: f64 = 1.0;

/// Depth score used when no order book is available.
const NEUTRAL_DEPTH_SCORE: f64 = 0.5;

/// Sizes entries against liquidity, volatility, and urgency.
pub struct EntryOptimizer {
  config: EntryConfig,
  costs: CostModel,
}

impl EntryOptimizer {
  /// Create an optimizer from config and the shared cost model.
  pub fn new(config: EntryConfig, costs: CostModel) -> Self {
    Self { config, costs }
  }

  /// Build an order plan for an accepted edge.
  ///
  /// `max_notional` is the ceiling the caller derived from remaining
  /// capacity; `change_timestamp_ms` is when the triggering forecast
  /// change was observed.
  pub fn plan_entry(
    &self,
    edge: &CalculatedEdge,
    book: Option<&BookSnapshot>,
    regime: VolatilityRegime,
    capital: f64,
    max_notional: f64,
    change_timestamp_ms: u64,
    now_ms: u64,
  ) -> EntrySignal {
    let base_size = edge.kelly_fraction * capital;

    let liquidity_mult = self.liquidity_multiplier(book, base_size);
    let vol_mult = Self::volatility_multiplier(regime);
    let urgency_factor = self.urgency_factor(change_timestamp_ms, now_ms);
    let urgency = self.classify_urgency(urgency_factor);

    let mut size = base_size * liquidity_mult * vol_mult;

    // Guaranteed and high-urgency signals scale up, bounded by config.
    if edge.is_guaranteed || urgency == Urgency::High {
      size *= self.config.guaranteed_position_multiplier;
    }

    size = size.min(max_notional).min(self.config.max_position_notional);
    if size < MIN_TRADE_USD {
      debug!(market = %edge.market_id, size, "Size below minimum, not trading");
      size = 0.0;
    }

    let order_type = if urgency == Urgency::High {
      OrderType::Market
    } else {
      OrderType::Limit
    };
    let price_limit = match order_type {
      OrderType::Market => None,
      OrderType::Limit => Some((edge.price + self.config.limit_price_buffer).min(0.99)),
    };

    let expected_slippage = self.costs.slippage(size);
    let market_impact = Self::market_impact(book, size, expected_slippage);
    let estimated_edge = edge.adjusted_edge - market_impact;

    let scale_in_tranches = self.scale_in_plan(size, order_type);

    EntrySignal {
      market_id: edge.market_id.clone(),
      side: edge.side,
      size_usd: size,
      order_type,
      urgency,
      price_limit,
      scale_in_tranches,
      expected_slippage,
      market_impact,
      estimated_edge,
      is_guaranteed: edge.is_guaranteed,
    }
  }

  /// Depth score x spread penalty, in [0, 1].
  ///
  /// No book yields the neutral mid-score. Both components only ever
  /// shrink size: a shallow book caps the depth score below 1, a wide
  /// spread scales it down further.
  fn liquidity_multiplier(&self, book: Option<&BookSnapshot>, base_size: f64) -> f64 {
    let Some(book) = book else {
      return NEUTRAL_DEPTH_SCORE;
    };

    let depth = book.ask_depth();
    let depth_score = if base_size > 0.0 {
      (depth / (base_size * 2.0)).min(1.0)
    } else {
      1.0
    };

    let spread_penalty = book
      .spread()
      .map_or(0.5, |s| (s.max(0.0) * 5.0).min(0.8));

    depth_score * (1.0 - spread_penalty)
  }

  /// Regime multiplier; strictly decreasing in regime severity.
  fn volatility_multiplier(regime: VolatilityRegime) -> f64 {
    match regime {
      VolatilityRegime::Low => 1.0,
      VolatilityRegime::Medium => 0.75,
      VolatilityRegime::High => 0.5,
      VolatilityRegime::Extreme => 0.25,
    }
  }

  /// Exponential decay in forecast-change age, floored at 0.1.
  fn urgency_factor(&self, change_timestamp_ms: u64, now_ms: u64) -> f64 {
    let age_secs = now_ms.saturating_sub(change_timestamp_ms) as f64 / 1000.0;
    (-age_secs / self.config.urgency_tau_secs).exp().max(0.1)
  }

  fn classify_urgency(&self, factor: f64) -> Urgency {
    if factor >= self.config.market_order_cutoff {
      Urgency::High
    } else if factor >= 0.4 {
      Urgency::Medium
    } else {
      Urgency::Low
    }
  }

  /// Fraction of top-of-book depth we would consume, priced in spread.
  fn market_impact(book: Option<&BookSnapshot>, size: f64, expected_slippage: f64) -> f64 {
    match book {
      Some(b) => {
        let depth = b.ask_depth();
        if depth > 0.0 {
          let consumed = (size / depth).min(1.0);
          consumed * b.spread().unwrap_or(0.02).max(0.0)
        } else {
          expected_slippage * 0.5
        }
      }
      None => expected_slippage * 0.5,
    }
  }

  /// Split large plans into tranches with increasing delays; later
  /// tranches default to limit orders to reduce impact.
  fn scale_in_plan(&self, size: f64, first_order_type: OrderType) -> Option<Vec<ScaleInTranche>> {
    if size <= self.config.scale_in_threshold_usd || self.config.scale_in_tranches <= 1 {
      return None;
    }

    let n = self.config.scale_in_tranches as usize;
    let fraction = 1.0 / n as f64;
    Some(
      (0..n)
        .map(|i| ScaleInTranche {
          fraction,
          delay_ms: i as u64 * self.config.tranche_delay_ms,
          order_type: if i == 0 { first_order_type } else { OrderType::Limit },
        })
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::types::{CostBreakdown, Side};

  fn test_config() -> EntryConfig {
    EntryConfig {
      max_position_notional: 500.0,
      scale_in_threshold_usd: 200.0,
      scale_in_tranches: 3,
      tranche_delay_ms: 30_000,
      urgency_tau_secs: 120.0,
      market_order_cutoff: 0.8,
      limit_price_buffer: 0.01,
      guaranteed_position_multiplier: 1.5,
    }
  }

  fn optimizer() -> EntryOptimizer {
    EntryOptimizer::new(test_config(), CostModel::default())
  }

  fn edge(kelly: f64) -> CalculatedEdge {
    CalculatedEdge {
      market_id: "m1".to_string(),
      side: Side::Yes,
      price: 0.50,
      raw_edge: 0.20,
      adjusted_edge: 0.12,
      confidence: 0.8,
      kelly_fraction: kelly,
      is_guaranteed: false,
      costs: CostBreakdown::default(),
    }
  }

  fn book(depth_each: f64, spread: f64) -> BookSnapshot {
    let mid = 0.50;
    BookSnapshot {
      token_id: "tok".to_string(),
      bids: vec![(mid - spread / 2.0, depth_each)],
      asks: vec![(mid + spread / 2.0, depth_each)],
      timestamp_ms: 0,
    }
  }

  #[test]
  fn test_fresh_change_is_market_order() {
    let opt = optimizer();
    let signal = opt.plan_entry(
      &edge(0.1),
      None,
      VolatilityRegime::Low,
      1000.0,
      500.0,
      1_000_000,
      1_000_000,
    );
    assert_eq!(signal.urgency, Urgency::High);
    assert_eq!(signal.order_type, OrderType::Market);
    assert!(signal.price_limit.is_none());
  }

  #[test]
  fn test_stale_change_is_limit_order() {
    let opt = optimizer();
    // 10 minutes after the change: urgency fully decayed to the floor.
    let signal = opt.plan_entry(
      &edge(0.1),
      None,
      VolatilityRegime::Low,
      1000.0,
      500.0,
      0,
      600_000,
    );
    assert_eq!(signal.urgency, Urgency::Low);
    assert_eq!(signal.order_type, OrderType::Limit);
    assert_eq!(signal.price_limit, Some(0.51));
  }

  #[test]
  fn test_urgency_floor() {
    let opt = optimizer();
    // Hours old: factor would be ~0 without the floor.
    let f = opt.urgency_factor(0, 36_000_000);
    assert!((f - 0.1).abs() < 1e-12);
  }

  #[test]
  fn test_shallow_book_reduces_size() {
    let opt = optimizer();
    let deep = opt.plan_entry(
      &edge(0.1),
      Some(&book(10_000.0, 0.01)),
      VolatilityRegime::Low,
      1000.0,
      500.0,
      0,
      600_000,
    );
    let shallow = opt.plan_entry(
      &edge(0.1),
      Some(&book(20.0, 0.01)),
      VolatilityRegime::Low,
      1000.0,
      500.0,
      0,
      600_000,
    );
    assert!(shallow.size_usd < deep.size_usd);
  }

  #[test]
  fn test_wide_spread_reduces_size() {
    let opt = optimizer();
    let tight = opt.plan_entry(
      &edge(0.1),
      Some(&book(10_000.0, 0.01)),
      VolatilityRegime::Low,
      1000.0,
      500.0,
      0,
      600_000,
    );
    let wide = opt.plan_entry(
      &edge(0.1),
      Some(&book(10_000.0, 0.10)),
      VolatilityRegime::Low,
      1000.0,
      500.0,
      0,
      600_000,
    );
    assert!(wide.size_usd < tight.size_usd);
  }

  #[test]
  fn test_volatility_regime_reduces_size() {
    let opt = optimizer();
    let sizes: Vec<f64> = [
      VolatilityRegime::Low,
      VolatilityRegime::Medium,
      VolatilityRegime::High,
      VolatilityRegime::Extreme,
    ]
    .iter()
    .map(|&regime| {
      opt
        .plan_entry(&edge(0.1), None, regime, 1000.0, 500.0, 0, 600_000)
        .size_usd
    })
    .collect();
    assert!(sizes.windows(2).all(|w| w[1] < w[0]), "sizes {sizes:?}");
  }

  #[test]
  fn test_guaranteed_scales_up_bounded() {
    let opt = optimizer();
    let mut guaranteed = edge(0.1);
    guaranteed.is_guaranteed = true;
    let plain = opt.plan_entry(&edge(0.1), None, VolatilityRegime::Low, 1000.0, 500.0, 0, 600_000);
    let boosted = opt.plan_entry(&guaranteed, None, VolatilityRegime::Low, 1000.0, 500.0, 0, 600_000);
    assert!((boosted.size_usd - plain.size_usd * 1.5).abs() < 1e-9);
  }

  #[test]
  fn test_tiny_size_is_do_not_trade() {
    let opt = optimizer();
    let signal = opt.plan_entry(&edge(0.0001), None, VolatilityRegime::Extreme, 100.0, 500.0, 0, 600_000);
    assert_eq!(signal.size_usd, 0.0);
  }

  #[test]
  fn test_scale_in_above_threshold() {
    let opt = optimizer();
    // Fresh guaranteed signal with deep book: size well above 200.
    let mut big = edge(0.4);
    big.is_guaranteed = true;
    let signal = opt.plan_entry(
      &big,
      Some(&book(100_000.0, 0.002)),
      VolatilityRegime::Low,
      1000.0,
      500.0,
      1_000_000,
      1_000_000,
    );
    assert!(signal.size_usd > 200.0, "size {}", signal.size_usd);
    let tranches = signal.scale_in_tranches.expect("tranches");
    assert_eq!(tranches.len(), 3);
    assert_eq!(tranches[0].order_type, OrderType::Market);
    assert_eq!(tranches[1].order_type, OrderType::Limit);
    assert!(tranches[0].delay_ms < tranches[1].delay_ms);
    assert!(tranches[1].delay_ms < tranches[2].delay_ms);
    let total: f64 = tranches.iter().map(|t| t.fraction).sum();
    assert!((total - 1.0).abs() < 1e-9);
  }

  #[test]
  fn test_max_notional_respected() {
    let opt = optimizer();
    let signal = opt.plan_entry(
      &edge(0.4),
      Some(&book(100_000.0, 0.002)),
      VolatilityRegime::Low,
      10_000.0,
      150.0,
      1_000_000,
      1_000_000,
    );
    assert!(signal.size_usd <= 150.0);
  }
}
