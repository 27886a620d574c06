//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! engine's core workflows. Each use case is a self-contained business
//! operation.
//!
//! Use cases:
//! - `MarketStateStore`: Per-market price/forecast time series
//! - `EntryOptimizer`: Edge to sized, typed order plan
//! - `ExitOptimizer`: Position exit state machine
//! - `PortfolioRiskGate`: Admission checks, capital ledger, kill switch
//! - `StrategyOrchestrator`: Decision cycle and trade lifecycle

pub mod entry_optimizer;
pub mod exit_optimizer;
pub mod market_store;
pub mod orchestrator;
pub mod risk_gate;
