//! Trading cost model: slippage, spread, and sigma-tiered safety margins.
//!
//! Prediction-market maker/taker fees are zero on the venues we target, so
//! the cost stack is slippage + a fixed spread estimate + a safety margin
//! that steps down as forecast confidence (sigma) rises.
//!
//! Guaranteed outcomes bypass this module entirely: speed dominates and
//! every cost is treated as zero.

use serde::Deserialize;

use super::types::CostBreakdown;

/// Safety-margin tiers keyed by sigma (standard deviations between the
/// forecast and the market threshold).
///
/// An undefined sigma defaults to the widest margin.
#[derive(Debug, Clone, Deserialize)]
pub struct SafetyMarginTiers {
    /// Margin when sigma >= 3.0 (high confidence, smallest margin).
    pub high_confidence: f64,
    /// Margin when sigma >= 2.0.
    pub medium_confidence: f64,
    /// Margin otherwise, including undefined sigma (largest).
    pub low_confidence: f64,
}

impl Default for SafetyMarginTiers {
    fn default() -> Self {
        Self {
            high_confidence: 0.02,
            medium_confidence: 0.03,
            low_confidence: 0.05,
        }
    }
}

/// Cost calculator applied to non-guaranteed edges.
#[derive(Debug, Clone)]
pub struct CostModel {
    /// Baseline slippage for any taker-ish fill.
    base_slippage: f64,
    /// Additional slippage per 1000 USDC of trade size.
    slippage_per_1k: f64,
    /// Fixed half-spread estimate.
    spread_estimate: f64,
    /// Sigma-tiered safety margins.
    margins: SafetyMarginTiers,
}

impl CostModel {
    /// Creates a cost model from configured parameters.
    pub fn new(
        base_slippage: f64,
        slippage_per_1k: f64,
        spread_estimate: f64,
        margins: SafetyMarginTiers,
    ) -> Self {
        Self {
            base_slippage,
            slippage_per_1k,
            spread_estimate,
            margins,
        }
    }

    /// Expected slippage for a trade of the given notional size.
    ///
    /// Linear impact model: base + per-1k component. Deliberately
    /// conservative for thin weather books.
    pub fn slippage(&self, trade_size_usd: f64) -> f64 {
        self.base_slippage + self.slippage_per_1k * (trade_size_usd.max(0.0) / 1000.0)
    }

    /// Safety margin as a step function of sigma.
    ///
    /// sigma >= 3.0 gets the smallest margin, >= 2.0 the medium one,
    /// anything else (including undefined) the largest.
    pub fn safety_margin(&self, sigma: Option<f64>) -> f64 {
        match sigma {
            Some(s) if s >= 3.0 => self.margins.high_confidence,
            Some(s) if s >= 2.0 => self.margins.medium_confidence,
            _ => self.margins.low_confidence,
        }
    }

    /// Full cost breakdown for a non-guaranteed trade.
    pub fn breakdown(&self, trade_size_usd: f64, sigma: Option<f64>) -> CostBreakdown {
        CostBreakdown {
            slippage: self.slippage(trade_size_usd),
            spread: self.spread_estimate,
            safety_margin: self.safety_margin(sigma),
        }
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            base_slippage: 0.01,
            slippage_per_1k: 0.005,
            spread_estimate: 0.02,
            margins: SafetyMarginTiers::default(),
        }
    }
}
