//! Volatility and market-regime classification.
//!
//! Translates the market store's velocity signal and recent price samples
//! into the regimes the sizing and exit layers key off. Classification is
//! pure: all state lives in the store, all thresholds in config.

use super::types::{MarketRegime, PricePoint, VolatilityRegime};

/// Classifies price velocity into a volatility regime.
///
/// Velocity is absolute price change per second over the trailing minute,
/// as maintained by the market store on every update.
#[derive(Debug, Clone)]
pub struct VolatilityClassifier {
    /// Velocity at or above which the regime is Medium.
    medium_velocity: f64,
    /// Velocity at or above which the regime is High.
    high_velocity: f64,
    /// Velocity at or above which the regime is Extreme.
    extreme_velocity: f64,
}

impl VolatilityClassifier {
    /// Creates a classifier with explicit velocity cutoffs.
    pub fn new(medium_velocity: f64, high_velocity: f64, extreme_velocity: f64) -> Self {
        Self {
            medium_velocity,
            high_velocity,
            extreme_velocity,
        }
    }

    /// Map a velocity reading to a regime.
    pub fn classify(&self, velocity_per_sec: f64) -> VolatilityRegime {
        let v = velocity_per_sec.abs();
        if v >= self.extreme_velocity {
            VolatilityRegime::Extreme
        } else if v >= self.high_velocity {
            VolatilityRegime::High
        } else if v >= self.medium_velocity {
            VolatilityRegime::Medium
        } else {
            VolatilityRegime::Low
        }
    }

    /// Classify market behavior from recent price samples.
    ///
    /// Net drift beyond one standard deviation reads as trending; large
    /// dispersion without drift reads as volatile; otherwise ranging.
    /// Fewer than 5 samples is Unknown.
    pub fn classify_market(&self, points: &[PricePoint]) -> MarketRegime {
        if points.len() < 5 {
            return MarketRegime::Unknown;
        }

        let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        let variance =
            prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
        let std_dev = variance.sqrt();

        let drift = prices[prices.len() - 1] - prices[0];

        // Dispersion above 5 price-cents is volatile regardless of drift.
        if std_dev > 0.05 {
            return MarketRegime::Volatile;
        }

        if drift.abs() > std_dev.max(0.005) {
            if drift > 0.0 {
                MarketRegime::TrendingUp
            } else {
                MarketRegime::TrendingDown
            }
        } else {
            MarketRegime::Ranging
        }
    }
}

impl Default for VolatilityClassifier {
    /// Defaults tuned for prediction-market tick rates: a sustained move of
    /// ~1 cent/min is Medium, ~5 cents/min High, ~15 cents/min Extreme.
    fn default() -> Self {
        Self {
            medium_velocity: 0.01 / 60.0,
            high_velocity: 0.05 / 60.0,
            extreme_velocity: 0.15 / 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(prices: &[f64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                price,
                timestamp_ms: 1_000 * i as u64,
            })
            .collect()
    }

    #[test]
    fn test_velocity_regimes() {
        let c = VolatilityClassifier::default();
        assert_eq!(c.classify(0.0), VolatilityRegime::Low);
        assert_eq!(c.classify(0.0002), VolatilityRegime::Medium);
        assert_eq!(c.classify(0.001), VolatilityRegime::High);
        assert_eq!(c.classify(0.01), VolatilityRegime::Extreme);
    }

    #[test]
    fn test_negative_velocity_uses_magnitude() {
        let c = VolatilityClassifier::default();
        assert_eq!(c.classify(-0.01), VolatilityRegime::Extreme);
    }

    #[test]
    fn test_market_regime_unknown_with_few_samples() {
        let c = VolatilityClassifier::default();
        assert_eq!(c.classify_market(&points(&[0.5, 0.5])), MarketRegime::Unknown);
    }

    #[test]
    fn test_market_regime_trending_up() {
        let c = VolatilityClassifier::default();
        let regime = c.classify_market(&points(&[0.50, 0.51, 0.52, 0.53, 0.54, 0.55]));
        assert_eq!(regime, MarketRegime::TrendingUp);
    }

    #[test]
    fn test_market_regime_trending_down() {
        let c = VolatilityClassifier::default();
        let regime = c.classify_market(&points(&[0.55, 0.54, 0.53, 0.52, 0.51, 0.50]));
        assert_eq!(regime, MarketRegime::TrendingDown);
    }

    #[test]
    fn test_market_regime_ranging() {
        let c = VolatilityClassifier::default();
        let regime = c.classify_market(&points(&[0.50, 0.501, 0.499, 0.50, 0.501, 0.50]));
        assert_eq!(regime, MarketRegime::Ranging);
    }

    #[test]
    fn test_market_regime_volatile() {
        let c = VolatilityClassifier::default();
        let regime = c.classify_market(&points(&[0.30, 0.55, 0.25, 0.60, 0.35, 0.50]));
        assert_eq!(regime, MarketRegime::Volatile);
    }
}
