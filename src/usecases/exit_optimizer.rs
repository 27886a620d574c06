//! Exit Optimizer - Position Exit State Machine
//!
//! Evaluates open positions against a fixed priority order; the first
//! matching rule wins:
//!
//! 1. Trailing stop (armed once the high-water mark reaches activation)
//! 2. Partial take-profit / partial stop-loss (once per direction)
//! 3. Stop loss
//! 4. Fair-value convergence
//! 5. Take profit
//! 6. Maximum hold time
//!
//! Thresholds come from the market regime. After any confirmed partial
//! exit the full take-profit widens (x1.2) and the stop tightens
//! (x0.8). Emitting a partial decision does not consume it: the flag is
//! committed via [`ExitOptimizer::confirm_partial`] only once the
//! exchange accepts the fill, so a rejected close leaves the same
//! partial on offer. Per-position tracking (high-water mark and partial
//! flags) must be purged via [`ExitOptimizer::clear`] when a position
//! closes, otherwise stale marks leak into the next trade in the same
//! market.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{ExitConfig, RegimeExitConfig};
use crate::domain::types::{ExitDecision, ExitReason, MarketId, MarketRegime, Position, Side};

/// Per-position exit bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
struct PositionTracking {
  /// Highest pnl percent seen since entry.
  high_water_pct: f64,
  partial_tp_taken: bool,
  partial_sl_taken: bool,
}

/// Stateful exit rule evaluator.
pub struct ExitOptimizer {
  config: ExitConfig,
  tracking: HashMap<MarketId, PositionTracking>,
}

impl ExitOptimizer {
  pub fn new(config: ExitConfig) -> Self {
    Self { config, tracking: HashMap::new() }
  }

  /// Evaluate a position; returns the first matching exit rule, if any.
  ///
  /// `fair_value` is the model's fair price for the held token (the
  /// forecast probability for YES, its complement for NO).
  pub fn evaluate(
    &mut self,
    position: &Position,
    regime: MarketRegime,
    fair_value: Option<f64>,
    now: DateTime<Utc>,
  ) -> Option<ExitDecision> {
    let thresholds = self.thresholds(regime);
    let pnl_pct = position.pnl_percent;

    let tracking = self.tracking.entry(position.market_id.clone()).or_default();
    tracking.high_water_pct = tracking.high_water_pct.max(pnl_pct);

    // 1. Trailing stop: armed at activation, fires on retracement.
    if thresholds.trailing_enabled
      && tracking.high_water_pct >= self.config.trailing_activation_pct
      && pnl_pct <= tracking.high_water_pct - self.config.trailing_offset_pct
    {
      debug!(
        market = %position.market_id,
        high_water = tracking.high_water_pct,
        pnl_pct,
        "Trailing stop fired"
      );
      return Some(ExitDecision::full(ExitReason::TrailingStop));
    }

    // 2. Partial exits, once per direction, at half the full threshold.
    //    Flags are committed by `confirm_partial` on fill, not here.
    if thresholds.partial_enabled {
      if !tracking.partial_tp_taken && pnl_pct >= thresholds.take_profit_pct * 0.5 {
        return Some(ExitDecision::partial(
          self.config.partial_fraction,
          ExitReason::PartialTakeProfit,
        ));
      }
      if !tracking.partial_sl_taken && pnl_pct <= thresholds.stop_loss_pct * 0.5 {
        return Some(ExitDecision::partial(
          self.config.partial_fraction,
          ExitReason::PartialStopLoss,
        ));
      }
    }

    let partial_taken = tracking.partial_tp_taken || tracking.partial_sl_taken;

    // 3. Stop loss, tightened after a prior partial exit.
    let stop_loss = if partial_taken {
      thresholds.stop_loss_pct * 0.8
    } else {
      thresholds.stop_loss_pct
    };
    if pnl_pct <= stop_loss {
      return Some(ExitDecision::full(ExitReason::StopLoss));
    }

    // 4. Fair-value overshoot: the price has run past the model's fair
    //    value in the position's favor while in profit.
    if let Some(fair) = fair_value {
      if pnl_pct > 0.0 && position.current_price > 0.0 {
        let remaining_edge_pct = (fair - position.current_price) / position.current_price * 100.0;
        if remaining_edge_pct <= -self.config.fair_value_margin_pct {
          return Some(ExitDecision::full(ExitReason::FairValue));
        }
      }
    }

    // 5. Take profit, widened after a prior partial exit.
    let take_profit = if partial_taken {
      thresholds.take_profit_pct * 1.2
    } else {
      thresholds.take_profit_pct
    };
    if pnl_pct >= take_profit {
      return Some(ExitDecision::full(ExitReason::TakeProfit));
    }

    // 6. Time limit.
    let age = now.signed_duration_since(position.entry_time);
    if age.num_hours() >= self.config.max_hold_hours as i64 {
      return Some(ExitDecision::full(ExitReason::TimeLimit));
    }

    None
  }

  /// Fair price of the held token given the forecast probability.
  pub fn held_fair_value(side: Side, forecast_probability: f64) -> f64 {
    match side {
      Side::Yes => forecast_probability,
      Side::No => 1.0 - forecast_probability,
    }
  }

  /// Commit a partial exit once the exchange has accepted the fill.
  ///
  /// The once-per-direction flag is consumed here, never at emission:
  /// a close that fails or is rejected leaves the flags untouched and
  /// the same partial is offered again on the next evaluation.
  pub fn confirm_partial(&mut self, market_id: &str, reason: ExitReason) {
    let Some(tracking) = self.tracking.get_mut(market_id) else {
      return;
    };
    match reason {
      ExitReason::PartialTakeProfit => tracking.partial_tp_taken = true,
      ExitReason::PartialStopLoss => tracking.partial_sl_taken = true,
      _ => {}
    }
  }

  /// Drop tracking for a closed position.
  pub fn clear(&mut self, market_id: &str) {
    self.tracking.remove(market_id);
  }

  fn thresholds(&self, regime: MarketRegime) -> RegimeExitConfig {
    match regime {
      MarketRegime::TrendingUp | MarketRegime::TrendingDown => self.config.trending,
      MarketRegime::Ranging => self.config.ranging,
      MarketRegime::Volatile => self.config.volatile,
      MarketRegime::Unknown => self.config.unknown,
    }
  }
}
