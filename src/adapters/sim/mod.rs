//! Simulation Adapters - Paper Trading and Synthetic Feeds
//!
//! Implements the market feed, forecast feed, and execution ports with
//! deterministic simulations so the binary runs end-to-end in dry-run
//! mode with no exchange or weather-provider credentials.
//!
//! - `feed`: synthetic forecast walks and lagging market prices (the lag
//!   is what creates tradeable edge)
//! - `executor`: paper fills against the simulated book with a price
//!   drift tolerance check

pub mod executor;
pub mod feed;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::types::MarketId;

/// Shared simulation state: the forecast-implied fair YES price per
/// market, written by the forecast feed and chased by the price feed.
#[derive(Default)]
pub struct SimWorld {
    fair_yes: RwLock<HashMap<MarketId, f64>>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the fair YES price implied by the latest forecast.
    pub fn set_fair_yes(&self, market_id: &MarketId, probability: f64) {
        self.fair_yes
            .write()
            .expect("sim world lock poisoned")
            .insert(market_id.clone(), probability.clamp(0.01, 0.99));
    }

    /// Fair YES price for a market; 0.5 before the first forecast.
    pub fn fair_yes(&self, market_id: &MarketId) -> f64 {
        self.fair_yes
            .read()
            .expect("sim world lock poisoned")
            .get(market_id)
            .copied()
            .unwrap_or(0.5)
    }
}
