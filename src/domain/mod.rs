//! Domain layer - Core business logic and models.
//!
//! This module contains the pure decision logic for the weather arbitrage
//! engine. No external dependencies allowed here (hexagonal architecture
//! inner ring). All types are serializable and testable in isolation.

pub mod costs;
pub mod edge;
pub mod kelly;
pub mod types;
pub mod volatility;

// Re-export core types for convenience
pub use costs::CostModel;
pub use edge::{EdgeCalculator, EdgeRequest};
pub use kelly::{KellyCriterion, KellySizer};
pub use types::{
    CalculatedEdge, CapturedOpportunity, ComparisonType, EntrySignal, ExitDecision,
    ExitReason, ForecastSnapshot, MarketRegime, OrderType, ParsedWeatherMarket, Position,
    PricePoint, Side, Urgency, VolatilityRegime,
};
pub use volatility::VolatilityClassifier;
