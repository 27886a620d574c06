//! Portfolio Risk Gate - Admission Control and Kill Switch
//!
//! Every new position passes through `can_admit`, which checks, in order
//! and short-circuiting on the first failure:
//! 1. Kill switch (overrides everything)
//! 2. Duplicate position in the market
//! 3. Single-position cap
//! 4. Maximum total exposure
//! 5. Minimum cash reserve
//! 6. Maximum portfolio heat (sum of Kelly fractions)
//! 7. Correlated-exposure cap (markets sharing an event key)
//!
//! The kill switch is a circuit breaker on consecutive losses and drawdown
//! against peak capital. Once tripped it halts ALL admissions until the
//! cooldown elapses or an operator resets it — no strategy-level logic can
//! bypass it.
//!
//! Capital, heat, and exposure are mutated only through this struct's
//! `&mut self` methods; the orchestrator serializes every admission/close
//! event through a single path.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::RiskConfig;
use crate::domain::types::MarketId;

/// Which admission constraint a candidate violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AdmitRejection {
  #[error("kill_switch")]
  KillSwitch,
  #[error("duplicate_position")]
  DuplicatePosition,
  #[error("position_cap")]
  PositionCap,
  #[error("max_exposure")]
  MaxExposure,
  #[error("cash_reserve")]
  CashReserve,
  #[error("heat_cap")]
  HeatCap,
  #[error("correlated_exposure")]
  CorrelatedExposure,
}

impl AdmitRejection {
  /// Stable label for metrics and logging.
  pub fn label(&self) -> &'static str {
    match self {
      Self::KillSwitch => "kill_switch",
      Self::DuplicatePosition => "duplicate_position",
      Self::PositionCap => "position_cap",
      Self::MaxExposure => "max_exposure",
      Self::CashReserve => "cash_reserve",
      Self::HeatCap => "heat_cap",
      Self::CorrelatedExposure => "correlated_exposure",
    }
  }
}

/// Exposure bookkeeping for one open position.
#[derive(Debug, Clone)]
struct OpenExposure {
  size_usd: f64,
  kelly_fraction: f64,
  event_key: String,
}

/// Kill switch tracking consecutive losses and drawdown.
#[derive(Debug, Clone)]
struct CircuitBreaker {
  /// Consecutive losses before tripping.
  loss_threshold: u32,
  /// Drawdown fraction from peak capital that trips immediately.
  max_drawdown_fraction: f64,
  /// Cooldown period (seconds).
  cooldown_seconds: u64,
  /// Consecutive loss counter.
  consecutive_losses: u32,
  /// Whether the breaker is tripped.
  tripped: bool,
  /// When the breaker tripped (Unix ms).
  tripped_at_ms: Option<u64>,
}

impl CircuitBreaker {
  fn new(config: &RiskConfig) -> Self {
    Self {
      loss_threshold: config.circuit_breaker_losses,
      max_drawdown_fraction: config.max_drawdown_fraction,
      cooldown_seconds: config.cooldown_seconds,
      consecutive_losses: 0,
      tripped: false,
      tripped_at_ms: None,
    }
  }

  /// Active means admissions are halted. The breaker stays tripped until
  /// the cooldown elapses or an operator resets it.
  fn is_active(&self, now_ms: u64) -> bool {
    if !self.tripped {
      return false;
    }
    match self.tripped_at_ms {
      Some(at) => {
        let elapsed_secs = now_ms.saturating_sub(at) / 1000;
        elapsed_secs < self.cooldown_seconds
      }
      None => true,
    }
  }

  fn record_result(&mut self, pnl: f64, drawdown_fraction: f64, now_ms: u64) {
    if pnl < 0.0 {
      self.consecutive_losses += 1;
    } else {
      self.consecutive_losses = 0;
    }

    if self.consecutive_losses >= self.loss_threshold {
      self.trip(now_ms, "consecutive losses");
    } else if drawdown_fraction >= self.max_drawdown_fraction {
      self.trip(now_ms, "drawdown");
    }
  }

  fn trip(&mut self, now_ms: u64, cause: &str) {
    if !self.tripped {
      warn!(
        cause,
        consecutive_losses = self.consecutive_losses,
        cooldown_seconds = self.cooldown_seconds,
        "Kill switch tripped — all admissions halted"
      );
    }
    self.tripped = true;
    self.tripped_at_ms = Some(now_ms);
  }

  fn reset(&mut self) {
    self.tripped = false;
    self.tripped_at_ms = None;
    self.consecutive_losses = 0;
  }
}

/// Admission control and capital/heat/exposure ledger.
///
/// Capital is accumulated in `Decimal` so realized PnL over thousands of
/// closes does not drift; all public getters return `f64` for the
/// usecase boundary.
pub struct PortfolioRiskGate {
  /// Maximum single position as fraction of capital.
  max_position_fraction: f64,
  /// Maximum total exposure as fraction of capital.
  max_portfolio_exposure: f64,
  /// Minimum cash ratio that must remain after an admission.
  min_cash_reserve: f64,
  /// Maximum portfolio heat (sum of Kelly fractions).
  max_kelly_heat: f64,
  /// Maximum exposure to markets sharing an event key.
  max_correlated_exposure: f64,
  /// Current capital (cash + positions at cost).
  current_capital: Decimal,
  /// Peak capital seen, for drawdown.
  peak_capital: Decimal,
  /// Exposure ledger keyed by market id.
  open: HashMap<MarketId, OpenExposure>,
  /// Kill switch.
  breaker: CircuitBreaker,
  /// Admission rejection tallies by constraint.
  rejections: HashMap<AdmitRejection, u64>,
}

impl PortfolioRiskGate {
  /// Create a gate from config, with full starting capital.
  pub fn new(config: &RiskConfig) -> Self {
    let capital = Decimal::from_f64(config.starting_capital).unwrap_or(Decimal::ZERO);
    Self {
      max_position_fraction: config.max_position_fraction,
      max_portfolio_exposure: config.max_portfolio_exposure,
      min_cash_reserve: config.min_cash_reserve,
      max_kelly_heat: config.max_kelly_heat,
      max_correlated_exposure: config.max_correlated_exposure,
      current_capital: capital,
      peak_capital: capital,
      open: HashMap::new(),
      breaker: CircuitBreaker::new(config),
      rejections: HashMap::new(),
    }
  }

  /// Check whether a new position can be admitted.
  ///
  /// Checks run in the documented order and short-circuit on the first
  /// violated constraint, which is tallied for observability.
  pub fn can_admit(
    &mut self,
    market_id: &MarketId,
    size_usd: f64,
    kelly_fraction: f64,
    event_key: &str,
    now_ms: u64,
  ) -> Result<(), AdmitRejection> {
    let result = self.check(market_id, size_usd, kelly_fraction, event_key, now_ms);
    if let Err(rejection) = result {
      *self.rejections.entry(rejection).or_insert(0) += 1;
      info!(
        market = %market_id,
        size = size_usd,
        constraint = %rejection,
        "Admission rejected"
      );
    }
    result
  }

  fn check(
    &self,
    market_id: &MarketId,
    size_usd: f64,
    kelly_fraction: f64,
    event_key: &str,
    now_ms: u64,
  ) -> Result<(), AdmitRejection> {
    // 1. Kill switch first: overrides everything.
    if self.breaker.is_active(now_ms) {
      return Err(AdmitRejection::KillSwitch);
    }

    // 2. One position per market.
    if self.open.contains_key(market_id) {
      return Err(AdmitRejection::DuplicatePosition);
    }

    let capital = self.capital();
    if capital <= 0.0 {
      return Err(AdmitRejection::KillSwitch);
    }

    // 3. Single-position cap.
    if size_usd / capital > self.max_position_fraction {
      return Err(AdmitRejection::PositionCap);
    }

    // 4. Total exposure cap.
    let exposure = self.exposure();
    if (exposure + size_usd) / capital > self.max_portfolio_exposure {
      return Err(AdmitRejection::MaxExposure);
    }

    // 5. Cash reserve after admission.
    let cash_after = capital - exposure - size_usd;
    if cash_after / capital < self.min_cash_reserve {
      return Err(AdmitRejection::CashReserve);
    }

    // 6. Portfolio heat.
    if self.heat() + kelly_fraction > self.max_kelly_heat {
      return Err(AdmitRejection::HeatCap);
    }

    // 7. Correlated exposure (same city/event).
    let correlated: f64 = self
      .open
      .values()
      .filter(|e| e.event_key == event_key)
      .map(|e| e.size_usd)
      .sum();
    if (correlated + size_usd) / capital > self.max_correlated_exposure {
      return Err(AdmitRejection::CorrelatedExposure);
    }

    Ok(())
  }

  /// Record an admitted position opening. Capital is unchanged (cash
  /// converts to exposure at cost).
  pub fn record_open(
    &mut self,
    market_id: &MarketId,
    size_usd: f64,
    kelly_fraction: f64,
    event_key: &str,
  ) {
    self.open.insert(
      market_id.clone(),
      OpenExposure {
        size_usd,
        kelly_fraction,
        event_key: event_key.to_string(),
      },
    );
  }

  /// Record a partial close: shrink the exposure entry, realize PnL.
  pub fn record_partial_close(&mut self, market_id: &MarketId, closed_size_usd: f64, pnl: f64, now_ms: u64) {
    if let Some(entry) = self.open.get_mut(market_id) {
      let fraction_closed = if entry.size_usd > 0.0 {
        (closed_size_usd / entry.size_usd).min(1.0)
      } else {
        1.0
      };
      entry.size_usd = (entry.size_usd - closed_size_usd).max(0.0);
      entry.kelly_fraction *= 1.0 - fraction_closed;
    }
    self.settle(pnl, now_ms);
  }

  /// Record a full close: drop the entry, realize PnL, update the breaker.
  pub fn record_close(&mut self, market_id: &MarketId, pnl: f64, now_ms: u64) {
    self.open.remove(market_id);
    self.settle(pnl, now_ms);
  }

  fn settle(&mut self, pnl: f64, now_ms: u64) {
    let delta = Decimal::from_f64(pnl).unwrap_or(Decimal::ZERO);
    self.current_capital += delta;
    if self.current_capital > self.peak_capital {
      self.peak_capital = self.current_capital;
    }

    if self.current_capital <= Decimal::ZERO {
      // Corrupted/negative capital is fatal: halt until operator reset.
      error!(capital = %self.current_capital, "Capital exhausted — tripping kill switch");
      self.breaker.trip(now_ms, "capital exhausted");
      return;
    }

    let drawdown = self.drawdown();
    self.breaker.record_result(pnl, drawdown, now_ms);
  }

  /// Current capital in USDC.
  pub fn capital(&self) -> f64 {
    self.current_capital.to_f64().unwrap_or(0.0)
  }

  /// Peak capital in USDC.
  pub fn peak_capital(&self) -> f64 {
    self.peak_capital.to_f64().unwrap_or(0.0)
  }

  /// Sum of open position notionals.
  pub fn exposure(&self) -> f64 {
    self.open.values().map(|e| e.size_usd).sum()
  }

  /// Portfolio heat: sum of Kelly fractions across open positions.
  pub fn heat(&self) -> f64 {
    self.open.values().map(|e| e.kelly_fraction).sum()
  }

  /// Drawdown from peak capital as a fraction.
  pub fn drawdown(&self) -> f64 {
    let peak = self.peak_capital();
    if peak <= 0.0 {
      return 0.0;
    }
    ((peak - self.capital()) / peak).max(0.0)
  }

  /// Number of open positions tracked.
  pub fn open_position_count(&self) -> usize {
    self.open.len()
  }

  /// Whether the kill switch currently halts admissions.
  pub fn kill_switch_active(&self, now_ms: u64) -> bool {
    self.breaker.is_active(now_ms)
  }

  /// Operator reset of the kill switch.
  pub fn reset_kill_switch(&mut self) {
    info!("Kill switch reset by operator");
    self.breaker.reset();
  }

  /// Rejection tallies by constraint label.
  pub fn rejection_counts(&self) -> HashMap<&'static str, u64> {
    self
      .rejections
      .iter()
      .map(|(k, v)| (k.label(), *v))
      .collect()
  }
}
