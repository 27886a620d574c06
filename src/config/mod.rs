//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`. The result is a
//! single immutable struct, built once at startup and passed by reference
//! to every component — there is no runtime reconfiguration path.
//! All market definitions and risk parameters are externalized here;
//! nothing is hardcoded in the domain layer.

pub mod loader;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::costs::SafetyMarginTiers;
use crate::domain::types::{ComparisonType, ParsedWeatherMarket};

/// Top-level engine configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the engine begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Bot identity and metadata.
  pub bot: BotConfig,
  /// Market definitions and token mappings.
  pub markets: Vec<MarketConfig>,
  /// Edge calculation and cost model parameters.
  pub trading: TradingConfig,
  /// Entry sizing parameters.
  pub entry: EntryConfig,
  /// Exit state machine parameters.
  pub exit: ExitConfig,
  /// Portfolio risk and circuit breaker parameters.
  pub risk: RiskConfig,
  /// Decision cycle scheduling and retention windows.
  pub engine: EngineConfig,
  /// Metrics and monitoring.
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  pub persistence: PersistenceConfig,
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable bot name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Enable dry-run mode (paper execution, no real orders).
  #[serde(default = "default_true")]
  pub dry_run: bool,
}

/// Individual weather market configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
  /// Human-readable market name / question.
  pub name: String,
  /// Exchange market identifier.
  pub market_id: String,
  /// YES outcome token ID.
  pub yes_token_id: String,
  /// NO outcome token ID.
  pub no_token_id: String,
  /// Metric threshold the market asks about (e.g. 90.0 degrees).
  pub threshold: f64,
  /// Above/below comparison.
  pub comparison: ComparisonType,
  /// Correlation key shared by markets on the same city/event.
  pub event_key: String,
  /// Market resolution date.
  pub target_date: DateTime<Utc>,
  /// Initial YES price until the feed ticks.
  #[serde(default = "default_half")]
  pub price_yes: f64,
  /// Initial NO price until the feed ticks.
  #[serde(default = "default_half")]
  pub price_no: f64,
  /// Whether this market is actively traded.
  #[serde(default = "default_true")]
  pub active: bool,
}

impl MarketConfig {
  /// Registration record for the market store.
  pub fn to_parsed(&self) -> ParsedWeatherMarket {
    ParsedWeatherMarket {
      market_id: self.market_id.clone(),
      question: self.name.clone(),
      yes_token_id: self.yes_token_id.clone(),
      no_token_id: self.no_token_id.clone(),
      threshold: self.threshold,
      comparison: self.comparison,
      event_key: self.event_key.clone(),
      target_date: self.target_date,
      price_yes: self.price_yes,
      price_no: self.price_no,
    }
  }
}

/// Edge calculation and cost model parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
  /// Minimum cost-adjusted edge for non-guaranteed signals.
  pub min_edge_threshold: f64,
  /// Global edge floor applied on top of the configured minimum.
  #[serde(default = "default_global_min_edge")]
  pub global_min_edge: f64,
  /// Kelly fraction multiplier (0.25 = quarter-Kelly).
  #[serde(default = "default_kelly_fraction")]
  pub kelly_fraction: f64,
  /// Baseline slippage assumed for any fill.
  #[serde(default = "default_base_slippage")]
  pub base_slippage: f64,
  /// Additional slippage per 1000 USDC of size.
  #[serde(default = "default_slippage_per_1k")]
  pub slippage_per_1k: f64,
  /// Fixed spread estimate subtracted from raw edge.
  #[serde(default = "default_spread_estimate")]
  pub spread_estimate: f64,
  /// Sigma-tiered safety margins.
  #[serde(default)]
  pub safety_margins: SafetyMarginTiers,
  /// Forecast move (metric units) that counts as a significant change.
  #[serde(default = "default_significance")]
  pub metric_significance_threshold: f64,
  /// Forecast move required before re-entering a captured market.
  #[serde(default = "default_reentry_delta")]
  pub reentry_delta: f64,
}

/// Entry sizing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryConfig {
  /// Hard ceiling on a single entry's notional (USDC).
  pub max_position_notional: f64,
  /// Notional above which entries are split into tranches.
  #[serde(default = "default_scale_in_threshold")]
  pub scale_in_threshold_usd: f64,
  /// Number of tranches for scaled entries.
  #[serde(default = "default_scale_in_tranches")]
  pub scale_in_tranches: u32,
  /// Delay between successive tranches (ms).
  #[serde(default = "default_tranche_delay")]
  pub tranche_delay_ms: u64,
  /// Urgency decay time constant (seconds since forecast change).
  #[serde(default = "default_urgency_tau")]
  pub urgency_tau_secs: f64,
  /// Urgency at or above which a market order is used.
  #[serde(default = "default_market_order_cutoff")]
  pub market_order_cutoff: f64,
  /// Limit price buffer added above the observed ask for limit entries.
  #[serde(default = "default_limit_buffer")]
  pub limit_price_buffer: f64,
  /// Size multiplier for guaranteed / high-urgency signals (bounded).
  #[serde(default = "default_guaranteed_multiplier")]
  pub guaranteed_position_multiplier: f64,
}

/// Take-profit / stop-loss pair for one market regime.
///
/// `stop_loss_pct` is negative. Pairs must keep at least a 2:1
/// reward:risk ratio (validated at load).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RegimeExitConfig {
  /// Positive take-profit threshold in pnl percent.
  pub take_profit_pct: f64,
  /// Negative stop-loss threshold in pnl percent.
  pub stop_loss_pct: f64,
  /// Whether the trailing stop applies in this regime.
  #[serde(default = "default_true")]
  pub trailing_enabled: bool,
  /// Whether partial scale-outs apply in this regime.
  #[serde(default = "default_true")]
  pub partial_enabled: bool,
}

/// Exit state machine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
  /// Thresholds for trending markets (up and down).
  pub trending: RegimeExitConfig,
  /// Thresholds for ranging markets.
  pub ranging: RegimeExitConfig,
  /// Thresholds for volatile markets.
  pub volatile: RegimeExitConfig,
  /// Thresholds when the regime is unknown.
  pub unknown: RegimeExitConfig,
  /// High-water-mark pnl percent that arms the trailing stop.
  #[serde(default = "default_trailing_activation")]
  pub trailing_activation_pct: f64,
  /// Retracement below the mark that fires the trailing stop.
  #[serde(default = "default_trailing_offset")]
  pub trailing_offset_pct: f64,
  /// Fraction closed by a partial exit.
  #[serde(default = "default_partial_fraction")]
  pub partial_fraction: f64,
  /// Maximum hold duration before a forced exit (hours).
  #[serde(default = "default_max_hold")]
  pub max_hold_hours: u64,
  /// Pnl percent margin for the fair-value exit rule.
  #[serde(default = "default_fair_value_margin")]
  pub fair_value_margin_pct: f64,
}

/// Portfolio risk management configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
  /// Starting capital in USDC.
  pub starting_capital: f64,
  /// Maximum single position as a fraction of capital.
  #[serde(default = "default_max_position_fraction")]
  pub max_position_fraction: f64,
  /// Maximum total exposure as a fraction of capital.
  #[serde(default = "default_max_exposure")]
  pub max_portfolio_exposure: f64,
  /// Minimum cash ratio that must remain after an admission.
  #[serde(default = "default_min_cash_reserve")]
  pub min_cash_reserve: f64,
  /// Maximum portfolio heat (sum of Kelly fractions).
  #[serde(default = "default_max_heat")]
  pub max_kelly_heat: f64,
  /// Maximum exposure to correlated markets (same event key).
  #[serde(default = "default_max_correlated")]
  pub max_correlated_exposure: f64,
  /// Circuit breaker: consecutive losses before the kill switch trips.
  #[serde(default = "default_circuit_breaker")]
  pub circuit_breaker_losses: u32,
  /// Circuit breaker: drawdown from peak capital that trips the kill switch.
  #[serde(default = "default_max_drawdown")]
  pub max_drawdown_fraction: f64,
  /// Cool-down period after a kill-switch trip (seconds).
  #[serde(default = "default_cooldown")]
  pub cooldown_seconds: u64,
}

/// Decision cycle scheduling and data retention.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Interval between decision cycles (seconds).
  #[serde(default = "default_cycle_interval")]
  pub cycle_interval_secs: u64,
  /// Debounce window for forecast-change pre-emption (seconds).
  #[serde(default = "default_debounce")]
  pub debounce_secs: u64,
  /// Price history retention window (seconds).
  #[serde(default = "default_price_retention")]
  pub price_retention_secs: u64,
  /// Forecast history retention window (hours).
  #[serde(default = "default_forecast_retention")]
  pub forecast_retention_hours: u64,
  /// Trailing window for the velocity statistic (seconds).
  #[serde(default = "default_velocity_window")]
  pub velocity_window_secs: u64,
  /// Bounded per-strategy trade history (oldest evicted).
  #[serde(default = "default_history_limit")]
  pub strategy_history_limit: usize,
  /// Cycles between strategy weight refreshes.
  #[serde(default = "default_weight_refresh")]
  pub weight_refresh_cycles: u64,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for JSONL decision logs and snapshots.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// State snapshot interval (seconds).
  #[serde(default = "default_snapshot_interval")]
  pub snapshot_interval_seconds: u64,
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_half() -> f64 {
  0.5
}

fn default_global_min_edge() -> f64 {
  0.02
}

fn default_kelly_fraction() -> f64 {
  0.25
}

fn default_base_slippage() -> f64 {
  0.01
}

fn default_slippage_per_1k() -> f64 {
  0.005
}

fn default_spread_estimate() -> f64 {
  0.02
}

fn default_significance() -> f64 {
  1.0
}

fn default_reentry_delta() -> f64 {
  1.0
}

fn default_scale_in_threshold() -> f64 {
  500.0
}

fn default_scale_in_tranches() -> u32 {
  3
}

fn default_tranche_delay() -> u64 {
  30_000
}

fn default_urgency_tau() -> f64 {
  120.0
}

fn default_market_order_cutoff() -> f64 {
  0.8
}

fn default_limit_buffer() -> f64 {
  0.01
}

fn default_guaranteed_multiplier() -> f64 {
  1.5
}

fn default_trailing_activation() -> f64 {
  10.0
}

fn default_trailing_offset() -> f64 {
  5.0
}

fn default_partial_fraction() -> f64 {
  0.5
}

fn default_max_hold() -> u64 {
  12
}

fn default_fair_value_margin() -> f64 {
  1.0
}

fn default_max_position_fraction() -> f64 {
  0.15
}

fn default_max_exposure() -> f64 {
  0.50
}

fn default_min_cash_reserve() -> f64 {
  0.10
}

fn default_max_heat() -> f64 {
  0.30
}

fn default_max_correlated() -> f64 {
  0.20
}

fn default_circuit_breaker() -> u32 {
  5
}

fn default_max_drawdown() -> f64 {
  0.15
}

fn default_cooldown() -> u64 {
  1800
}

fn default_cycle_interval() -> u64 {
  30
}

fn default_debounce() -> u64 {
  5
}

fn default_price_retention() -> u64 {
  600
}

fn default_forecast_retention() -> u64 {
  24
}

fn default_velocity_window() -> u64 {
  60
}

fn default_history_limit() -> usize {
  200
}

fn default_weight_refresh() -> u64 {
  20
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_snapshot_interval() -> u64 {
  60
}
