//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config: AppConfig = toml::from_str(&content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;

  info!(
    markets = config.markets.len(),
    min_edge = config.trading.min_edge_threshold,
    kelly = config.trading.kelly_fraction,
    capital = config.risk.starting_capital,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Positive numeric values where required
/// - Valid probability/fraction ranges
/// - Regime exit pairs keeping at least a 2:1 reward:risk ratio
/// - Non-empty market definitions
pub fn validate_config(config: &AppConfig) -> Result<()> {
  // Market validation
  anyhow::ensure!(
    !config.markets.is_empty(),
    "At least one market must be configured"
  );

  for (i, market) in config.markets.iter().enumerate() {
    anyhow::ensure!(
      !market.market_id.is_empty(),
      "Market {} ({}) has empty market_id",
      i,
      market.name
    );
    anyhow::ensure!(
      !market.yes_token_id.is_empty(),
      "Market {} ({}) has empty yes_token_id",
      i,
      market.name
    );
    anyhow::ensure!(
      !market.no_token_id.is_empty(),
      "Market {} ({}) has empty no_token_id",
      i,
      market.name
    );
    anyhow::ensure!(
      !market.event_key.is_empty(),
      "Market {} ({}) has empty event_key",
      i,
      market.name
    );
  }

  // Trading validation
  anyhow::ensure!(
    config.trading.min_edge_threshold >= 0.0 && config.trading.min_edge_threshold < 1.0,
    "min_edge_threshold must be in [0, 1), got {}",
    config.trading.min_edge_threshold
  );
  anyhow::ensure!(
    config.trading.kelly_fraction > 0.0 && config.trading.kelly_fraction <= 1.0,
    "Kelly fraction must be in (0, 1], got {}",
    config.trading.kelly_fraction
  );
  anyhow::ensure!(
    config.trading.reentry_delta > 0.0,
    "reentry_delta must be positive"
  );
  anyhow::ensure!(
    config.trading.metric_significance_threshold > 0.0,
    "metric_significance_threshold must be positive"
  );

  // Entry validation
  anyhow::ensure!(
    config.entry.max_position_notional > 0.0,
    "max_position_notional must be positive"
  );
  anyhow::ensure!(
    config.entry.scale_in_tranches >= 1,
    "scale_in_tranches must be at least 1"
  );
  anyhow::ensure!(
    config.entry.market_order_cutoff > 0.0 && config.entry.market_order_cutoff <= 1.0,
    "market_order_cutoff must be in (0, 1], got {}",
    config.entry.market_order_cutoff
  );
  anyhow::ensure!(
    config.entry.guaranteed_position_multiplier >= 1.0
      && config.entry.guaranteed_position_multiplier <= 2.0,
    "guaranteed_position_multiplier must be in [1, 2], got {}",
    config.entry.guaranteed_position_multiplier
  );

  // Exit validation: every regime pair keeps >= 2:1 reward:risk
  for (name, regime) in [
    ("trending", &config.exit.trending),
    ("ranging", &config.exit.ranging),
    ("volatile", &config.exit.volatile),
    ("unknown", &config.exit.unknown),
  ] {
    anyhow::ensure!(
      regime.take_profit_pct > 0.0,
      "{name} take_profit_pct must be positive"
    );
    anyhow::ensure!(
      regime.stop_loss_pct < 0.0,
      "{name} stop_loss_pct must be negative"
    );
    anyhow::ensure!(
      regime.take_profit_pct >= 2.0 * regime.stop_loss_pct.abs(),
      "{name} exit pair violates 2:1 reward:risk (tp={}, sl={})",
      regime.take_profit_pct,
      regime.stop_loss_pct
    );
  }
  anyhow::ensure!(
    config.exit.trailing_activation_pct > config.exit.trailing_offset_pct,
    "trailing_activation_pct must exceed trailing_offset_pct"
  );
  anyhow::ensure!(
    config.exit.partial_fraction > 0.0 && config.exit.partial_fraction < 1.0,
    "partial_fraction must be in (0, 1)"
  );
  anyhow::ensure!(config.exit.max_hold_hours > 0, "max_hold_hours must be positive");

  // Risk validation
  anyhow::ensure!(
    config.risk.starting_capital > 0.0,
    "starting_capital must be positive"
  );
  for (name, fraction) in [
    ("max_position_fraction", config.risk.max_position_fraction),
    ("max_portfolio_exposure", config.risk.max_portfolio_exposure),
    ("min_cash_reserve", config.risk.min_cash_reserve),
    ("max_kelly_heat", config.risk.max_kelly_heat),
    ("max_correlated_exposure", config.risk.max_correlated_exposure),
    ("max_drawdown_fraction", config.risk.max_drawdown_fraction),
  ] {
    anyhow::ensure!(
      fraction > 0.0 && fraction <= 1.0,
      "{name} must be in (0, 1], got {fraction}"
    );
  }
  anyhow::ensure!(
    config.risk.circuit_breaker_losses > 0,
    "circuit_breaker_losses must be positive"
  );

  // Engine validation
  anyhow::ensure!(
    config.engine.cycle_interval_secs > 0,
    "cycle_interval_secs must be positive"
  );
  anyhow::ensure!(
    config.engine.price_retention_secs >= config.engine.velocity_window_secs,
    "price_retention_secs must cover the velocity window"
  );
  anyhow::ensure!(
    config.engine.weight_refresh_cycles > 0,
    "weight_refresh_cycles must be positive"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_sample_config_parses_and_validates() {
    let toml = r#"
      [bot]
      name = "weather-arb-test"

      [[markets]]
      name = "NYC high above 90F Jul 4"
      market_id = "mkt-nyc-90"
      yes_token_id = "tok-yes"
      no_token_id = "tok-no"
      threshold = 90.0
      comparison = "above"
      event_key = "nyc"
      target_date = "2026-07-04T00:00:00Z"

      [trading]
      min_edge_threshold = 0.05

      [entry]
      max_position_notional = 250.0

      [exit]
      trending = { take_profit_pct = 20.0, stop_loss_pct = -10.0 }
      ranging = { take_profit_pct = 10.0, stop_loss_pct = -5.0 }
      volatile = { take_profit_pct = 30.0, stop_loss_pct = -15.0 }
      unknown = { take_profit_pct = 12.0, stop_loss_pct = -6.0 }

      [risk]
      starting_capital = 1000.0

      [engine]

      [metrics]

      [persistence]
    "#;
    let config: AppConfig = toml::from_str(toml).expect("parse");
    validate_config(&config).expect("validate");
    assert_eq!(config.markets.len(), 1);
    assert!(config.bot.dry_run);
    assert_eq!(config.risk.circuit_breaker_losses, 5);
  }

  #[test]
  fn test_bad_reward_risk_ratio_rejected() {
    let toml = r#"
      [bot]
      name = "t"

      [[markets]]
      name = "m"
      market_id = "m1"
      yes_token_id = "y"
      no_token_id = "n"
      threshold = 1.0
      comparison = "above"
      event_key = "e"
      target_date = "2026-07-04T00:00:00Z"

      [trading]
      min_edge_threshold = 0.05

      [entry]
      max_position_notional = 100.0

      [exit]
      trending = { take_profit_pct = 10.0, stop_loss_pct = -10.0 }
      ranging = { take_profit_pct = 10.0, stop_loss_pct = -5.0 }
      volatile = { take_profit_pct = 30.0, stop_loss_pct = -15.0 }
      unknown = { take_profit_pct = 12.0, stop_loss_pct = -6.0 }

      [risk]
      starting_capital = 1000.0

      [engine]

      [metrics]

      [persistence]
    "#;
    let config: AppConfig = toml::from_str(toml).expect("parse");
    assert!(validate_config(&config).is_err());
  }
}
