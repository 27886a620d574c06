//! Core trading domain types.
//!
//! Defines all business entities: weather markets, price samples, forecast
//! snapshots, calculated edges, entry signals, and positions.
//! These types are the foundation of the hexagonal architecture's inner ring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────
// Type aliases consumed by ports and adapters
// ────────────────────────────────────────────

/// Lightweight token identifier used at the ports boundary.
pub type TokenId = String;

/// Lightweight market identifier used at the ports boundary.
pub type MarketId = String;

// ────────────────────────────────────────────
// Enums shared across domain and ports
// ────────────────────────────────────────────

/// Outcome side of a binary weather market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// How the market question compares the metric against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonType {
    /// "Will the high temperature be above X?"
    Above,
    /// "Will the high temperature be below X?"
    Below,
}

/// Order type chosen by the entry optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Cross the spread immediately. Used when urgency is high.
    Market,
    /// Rest at a computed limit price. Used once urgency has decayed.
    Limit,
}

/// Urgency classification of an entry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Volatility regime derived from recent price velocity and dispersion.
///
/// Higher regimes strictly reduce position sizing multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
    Extreme,
}

/// Market behavior regime used to select exit thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    Unknown,
}

// ────────────────────────────────────────────
// Market registration input
// ────────────────────────────────────────────

/// A parsed weather market supplied by the discovery collaborator.
///
/// The core treats this as append-only registration input; parsing the
/// exchange catalog is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedWeatherMarket {
    /// Unique market identifier.
    pub market_id: MarketId,
    /// Market question, e.g. "Will NYC high temp exceed 90F on Jul 4?".
    pub question: String,
    /// Token ID for the YES outcome.
    pub yes_token_id: TokenId,
    /// Token ID for the NO outcome.
    pub no_token_id: TokenId,
    /// Metric threshold the question is asked against (e.g. 90.0 degrees).
    pub threshold: f64,
    /// Above/below comparison.
    pub comparison: ComparisonType,
    /// Correlation key: markets sharing it move together (same city/event).
    pub event_key: String,
    /// Date the market resolves on.
    pub target_date: DateTime<Utc>,
    /// Last known YES price at registration.
    pub price_yes: f64,
    /// Last known NO price at registration.
    pub price_no: f64,
}

// ────────────────────────────────────────────
// Time-series samples
// ────────────────────────────────────────────

/// A single price observation for one market side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Price in (0, 1).
    pub price: f64,
    /// Observation timestamp (Unix ms). Strictly non-decreasing per series.
    pub timestamp_ms: u64,
}

/// One forecast observation for a market.
///
/// `value_changed` is true only when the move from the previous value meets
/// the metric significance threshold AND this is not the market's first
/// observation. `is_initial` is set exactly once per market lifetime and is
/// checked uniformly instead of being inferred from `previous_value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    /// Market this forecast belongs to.
    pub market_id: MarketId,
    /// Raw forecast value in metric units (e.g. degrees).
    pub forecast_value: f64,
    /// Model-implied probability of the YES outcome, in (0, 1).
    pub probability: f64,
    /// Previous forecast value, if any.
    pub previous_value: Option<f64>,
    /// Whether this observation registers as a significant change.
    pub value_changed: bool,
    /// Signed move from the previous value (0 for the first observation).
    pub change_amount: f64,
    /// When the change was observed (Unix ms).
    pub change_timestamp_ms: u64,
    /// Forecast distance from the market threshold, in metric units.
    pub threshold_position: Option<f64>,
    /// Standard deviations between forecast and threshold (confidence proxy).
    pub sigma: Option<f64>,
    /// True for the market's first observation. Never registers as a change.
    pub is_initial: bool,
}

// ────────────────────────────────────────────
// Derived decision types
// ────────────────────────────────────────────

/// Cost components subtracted from a raw edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Expected slippage for the trade size.
    pub slippage: f64,
    /// Fixed spread estimate.
    pub spread: f64,
    /// Sigma-tiered safety margin.
    pub safety_margin: f64,
}

impl CostBreakdown {
    /// Total cost subtracted from the raw edge.
    pub fn total(&self) -> f64 {
        self.slippage + self.spread + self.safety_margin
    }
}

/// A cost-adjusted tradeable edge. Derived, never stored — recomputed per
/// evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatedEdge {
    /// Market the edge was found in.
    pub market_id: MarketId,
    /// Side to buy.
    pub side: Side,
    /// Market price of the chosen side at calculation time.
    pub price: f64,
    /// Model-implied probability minus market price, before costs.
    pub raw_edge: f64,
    /// Raw edge net of all costs.
    pub adjusted_edge: f64,
    /// Strategy-supplied confidence in [0, 1]; forced to 1.0 when guaranteed.
    pub confidence: f64,
    /// Fractional-Kelly sizing fraction of bankroll.
    pub kelly_fraction: f64,
    /// Forecast probability was >= 0.99 or <= 0.01.
    pub is_guaranteed: bool,
    /// Cost components applied (all zero when guaranteed).
    pub costs: CostBreakdown,
}

/// One tranche of a scaled-in entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleInTranche {
    /// Fraction of the total size allocated to this tranche.
    pub fraction: f64,
    /// Delay before submitting this tranche (ms).
    pub delay_ms: u64,
    /// Order type; later tranches default to limit to reduce impact.
    pub order_type: OrderType,
}

/// An executable order plan emitted by the entry optimizer.
///
/// A size of 0.0 is a valid "do not trade" outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySignal {
    /// Market to enter.
    pub market_id: MarketId,
    /// Side to buy.
    pub side: Side,
    /// Position size in USDC.
    pub size_usd: f64,
    /// Market or limit.
    pub order_type: OrderType,
    /// Urgency classification driving the order type.
    pub urgency: Urgency,
    /// Limit price when `order_type` is Limit.
    pub price_limit: Option<f64>,
    /// Scale-in plan for positions above the notional threshold.
    pub scale_in_tranches: Option<Vec<ScaleInTranche>>,
    /// Expected slippage for the final size.
    pub expected_slippage: f64,
    /// Estimated market impact of the order.
    pub market_impact: f64,
    /// Edge estimate net of expected slippage and impact.
    pub estimated_edge: f64,
    /// Carried from the edge: skip-costs fast path.
    pub is_guaranteed: bool,
}

// ────────────────────────────────────────────
// Positions and exits
// ────────────────────────────────────────────

/// An open position in a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Market the position is in.
    pub market_id: MarketId,
    /// Side held.
    pub side: Side,
    /// Average entry price.
    pub entry_price: f64,
    /// Latest observed price of the held token.
    pub current_price: f64,
    /// Position size in USDC.
    pub size_usd: f64,
    /// When the position was opened.
    pub entry_time: DateTime<Utc>,
    /// Unrealized PnL in USDC.
    pub pnl: f64,
    /// Unrealized PnL as a percentage of entry notional.
    pub pnl_percent: f64,
}

impl Position {
    /// Open a new position at the given fill price.
    pub fn open(
        market_id: MarketId,
        side: Side,
        entry_price: f64,
        size_usd: f64,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            market_id,
            side,
            entry_price,
            current_price: entry_price,
            size_usd,
            entry_time,
            pnl: 0.0,
            pnl_percent: 0.0,
        }
    }

    /// Mark the position to a new price of the held token.
    pub fn update_price(&mut self, price: f64) {
        self.current_price = price;
        if self.entry_price > 0.0 {
            self.pnl_percent = (price - self.entry_price) / self.entry_price * 100.0;
            self.pnl = self.size_usd * (price - self.entry_price) / self.entry_price;
        }
    }
}

/// Why a position was (partially) closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TrailingStop,
    PartialTakeProfit,
    PartialStopLoss,
    StopLoss,
    FairValue,
    TakeProfit,
    TimeLimit,
}

impl ExitReason {
    /// Stable label for metrics and logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TrailingStop => "trailing_stop",
            Self::PartialTakeProfit => "partial_take_profit",
            Self::PartialStopLoss => "partial_stop_loss",
            Self::StopLoss => "stop_loss",
            Self::FairValue => "fair_value",
            Self::TakeProfit => "take_profit",
            Self::TimeLimit => "time_limit",
        }
    }
}

/// Close instruction emitted by the exit optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitDecision {
    /// Fraction of the current size to close, in (0, 1].
    pub fraction: f64,
    /// First matching rule in the priority order.
    pub reason: ExitReason,
}

impl ExitDecision {
    /// Full close.
    pub fn full(reason: ExitReason) -> Self {
        Self { fraction: 1.0, reason }
    }

    /// Partial close of the given fraction.
    pub fn partial(fraction: f64, reason: ExitReason) -> Self {
        Self { fraction, reason }
    }

    /// Whether this closes the whole position.
    pub fn is_full(&self) -> bool {
        self.fraction >= 1.0
    }
}

/// Dedup marker blocking re-entry on the same stale signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapturedOpportunity {
    /// Forecast value at capture time.
    pub forecast_value: f64,
    /// When the opportunity was captured (Unix ms).
    pub captured_at_ms: u64,
}
