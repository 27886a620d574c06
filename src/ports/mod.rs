//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `MarketFeed`: Real-time price tick streaming and order book snapshots
//! - `ForecastFeed`: Asynchronous weather forecast updates
//! - `OrderExecution`: Entry placement and position close via the exchange
//! - `Repository`: Decision/trade persistence (JSONL-based)

pub mod execution;
pub mod forecast_feed;
pub mod market_feed;
pub mod repository;
