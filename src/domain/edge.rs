//! Cost-adjusted edge calculation.
//!
//! Converts (forecast probability, live yes/no prices, confidence) into a
//! tradeable edge net of costs, plus a fractional-Kelly sizing fraction.
//!
//! Insufficient edge is a no-signal outcome (`None`), never an error — it is
//! the expected result for the overwhelming majority of evaluations.

use super::costs::CostModel;
use super::kelly::KellySizer;
use super::types::{CalculatedEdge, CostBreakdown, MarketId, Side};

/// Probability at or beyond which an outcome is treated as guaranteed.
pub const GUARANTEED_PROBABILITY: f64 = 0.99;

/// One edge evaluation request.
#[derive(Debug, Clone)]
pub struct EdgeRequest {
    /// Market being evaluated.
    pub market_id: MarketId,
    /// Model-implied probability of the YES outcome.
    pub forecast_probability: f64,
    /// Live YES price.
    pub price_yes: f64,
    /// Live NO price.
    pub price_no: f64,
    /// Standard deviations between forecast and threshold, if known.
    pub sigma: Option<f64>,
    /// Intended trade notional for slippage estimation.
    pub trade_size_usd: f64,
    /// Skip all cost adjustment (caller override; guaranteed outcomes skip
    /// costs regardless).
    pub skip_costs: bool,
    /// Strategy-supplied confidence in [0, 1].
    pub confidence: f64,
}

/// Converts forecast probabilities into cost-adjusted tradeable edges.
#[derive(Debug, Clone)]
pub struct EdgeCalculator {
    /// Configured minimum edge for non-guaranteed signals.
    min_edge: f64,
    /// Global floor applied on top of the configured minimum.
    global_min_edge: f64,
    /// Fractional-Kelly sizer.
    kelly: KellySizer,
    /// Slippage/spread/margin model.
    costs: CostModel,
}

impl EdgeCalculator {
    /// Creates a calculator with the given thresholds and models.
    pub fn new(min_edge: f64, global_min_edge: f64, kelly: KellySizer, costs: CostModel) -> Self {
        Self {
            min_edge,
            global_min_edge,
            kelly,
            costs,
        }
    }

    /// The effective non-guaranteed threshold: max of configured and global.
    pub fn effective_min_edge(&self) -> f64 {
        self.min_edge.max(self.global_min_edge)
    }

    /// Evaluate one market. Returns `None` whenever there is nothing
    /// actionable: prices out of (0, 1), probability out of (0, 1), or edge
    /// below threshold.
    pub fn calculate(&self, req: &EdgeRequest) -> Option<CalculatedEdge> {
        let p = req.forecast_probability;
        if !(0.0..=1.0).contains(&p) {
            return None;
        }
        if !Self::valid_price(req.price_yes) || !Self::valid_price(req.price_no) {
            return None;
        }

        // Pick the larger of the two raw edges.
        let edge_yes = p - req.price_yes;
        let edge_no = (1.0 - p) - req.price_no;
        let (side, raw_edge, price) = if edge_yes >= edge_no {
            (Side::Yes, edge_yes, req.price_yes)
        } else {
            (Side::No, edge_no, req.price_no)
        };

        let is_guaranteed = p >= GUARANTEED_PROBABILITY || p <= 1.0 - GUARANTEED_PROBABILITY;

        // Guaranteed outcomes skip all costs; speed dominates.
        let costs = if is_guaranteed || req.skip_costs {
            CostBreakdown::default()
        } else {
            self.costs.breakdown(req.trade_size_usd, req.sigma)
        };

        let adjusted_edge = raw_edge - costs.total();

        // Guaranteed outcomes are actionable at any positive edge; everything
        // else must clear the configured minimum.
        let threshold = if is_guaranteed {
            0.0
        } else {
            self.effective_min_edge()
        };
        if adjusted_edge < threshold {
            return None;
        }

        let prob_win = match side {
            Side::Yes => p,
            Side::No => 1.0 - p,
        };

        let kelly_fraction = if is_guaranteed {
            // Safety multiplier itself, not raw Kelly, for binary certainty.
            self.kelly.guaranteed_fraction()
        } else {
            self.kelly.sizing_fraction(prob_win, price)
        };

        let confidence = if is_guaranteed {
            1.0
        } else {
            req.confidence.clamp(0.0, 1.0)
        };

        Some(CalculatedEdge {
            market_id: req.market_id.clone(),
            side,
            price,
            raw_edge,
            adjusted_edge,
            confidence,
            kelly_fraction,
            is_guaranteed,
            costs,
        })
    }

    fn valid_price(price: f64) -> bool {
        price > 0.0 && price < 1.0
    }
}
