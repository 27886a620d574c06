//! Synthetic Feeds - Deterministic Forecast and Price Simulation
//!
//! The forecast feed walks each market's metric from a start value to a
//! target value and publishes the implied YES probability into the
//! shared [`SimWorld`]. The price feed chases that fair value with a
//! configurable lag plus a small sinusoidal wiggle. The lag between the
//! forecast moving and the price catching up is what the engine trades.
//!
//! Everything is deterministic: the same scenario replays identically,
//! which keeps dry runs debuggable.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use super::SimWorld;
use crate::domain::types::{ComparisonType, MarketId, ParsedWeatherMarket, Side, TokenId};
use crate::ports::forecast_feed::{ForecastFeed, ForecastUpdate};
use crate::ports::market_feed::{BookSnapshot, MarketFeed, PriceTick};

/// Metric spread used to map forecast distance into a probability.
const PROBABILITY_SPREAD: f64 = 2.0;

/// Synthetic depth quoted on each side of the simulated book.
const BOOK_DEPTH_USD: f64 = 5_000.0;

/// Half-spread of the simulated book.
const BOOK_HALF_SPREAD: f64 = 0.01;

/// One market's scripted forecast walk.
#[derive(Debug, Clone)]
pub struct ForecastScript {
    /// Market the walk applies to.
    pub market_id: MarketId,
    /// Metric value at step zero.
    pub start_value: f64,
    /// Metric value the walk converges to.
    pub end_value: f64,
    /// Steps over which the walk interpolates.
    pub steps: u64,
}

/// Deterministic forecast provider implementing the `ForecastFeed` port.
pub struct SimForecastFeed {
    update_tx: broadcast::Sender<ForecastUpdate>,
    world: Arc<SimWorld>,
    markets: HashMap<MarketId, ParsedWeatherMarket>,
    scripts: Vec<ForecastScript>,
    interval_ms: u64,
}

impl SimForecastFeed {
    pub fn new(
        markets: Vec<ParsedWeatherMarket>,
        scripts: Vec<ForecastScript>,
        world: Arc<SimWorld>,
        interval_ms: u64,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(1024);
        Self {
            update_tx,
            world,
            markets: markets.into_iter().map(|m| (m.market_id.clone(), m)).collect(),
            scripts,
            interval_ms,
        }
    }

    /// Emit interpolated forecasts until the scripts finish or shutdown.
    #[instrument(skip(self, shutdown_rx), name = "sim_forecast_feed")]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut step: u64 = 0;
        let max_steps = self.scripts.iter().map(|s| s.steps).max().unwrap_or(0);
        let mut timer =
            tokio::time::interval(std::time::Duration::from_millis(self.interval_ms));

        info!(scripts = self.scripts.len(), "Sim forecast feed started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Sim forecast feed shutting down");
                    return Ok(());
                }
                _ = timer.tick() => {}
            }

            for script in &self.scripts {
                let Some(market) = self.markets.get(&script.market_id) else {
                    continue;
                };
                let value = script.value_at(step);
                let probability = implied_probability(value, market.threshold, market.comparison);
                let sigma = (value - market.threshold).abs() / PROBABILITY_SPREAD;

                self.world.set_fair_yes(&script.market_id, probability);
                let _ = self.update_tx.send(ForecastUpdate {
                    market_id: script.market_id.clone(),
                    forecast_value: value,
                    probability,
                    sigma: Some(sigma),
                    timestamp_ms: Utc::now().timestamp_millis() as u64,
                });
            }

            step += 1;
            if step > max_steps {
                // Hold the final value so open positions can still be marked.
                step = max_steps;
            }
            debug!(step, "Sim forecast step emitted");
        }
    }
}

#[async_trait]
impl ForecastFeed for SimForecastFeed {
    fn subscribe(&self) -> broadcast::Receiver<ForecastUpdate> {
        self.update_tx.subscribe()
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

impl ForecastScript {
    /// Linear interpolation with a small deterministic wiggle.
    fn value_at(&self, step: u64) -> f64 {
        let t = if self.steps == 0 {
            1.0
        } else {
            (step.min(self.steps) as f64) / self.steps as f64
        };
        let base = self.start_value + (self.end_value - self.start_value) * t;
        base + 0.1 * (step as f64 * 0.9).sin()
    }
}

/// Forecast-implied YES probability via a logistic curve over the
/// distance to the threshold, oriented by the comparison type.
fn implied_probability(value: f64, threshold: f64, comparison: ComparisonType) -> f64 {
    let distance = (value - threshold) / PROBABILITY_SPREAD;
    let p_above = 1.0 / (1.0 + (-distance * 2.0).exp());
    match comparison {
        ComparisonType::Above => p_above,
        ComparisonType::Below => 1.0 - p_above,
    }
}

/// Deterministic price feed implementing the `MarketFeed` port.
///
/// Prices converge toward the world's fair value with a per-tick chase
/// factor, so the engine sees a lag it can act on.
pub struct SimMarketFeed {
    tick_tx: broadcast::Sender<PriceTick>,
    world: Arc<SimWorld>,
    markets: Vec<ParsedWeatherMarket>,
    last_prices: RwLock<HashMap<TokenId, f64>>,
    interval_ms: u64,
    /// Fraction of the gap to fair value closed per tick.
    chase: f64,
}

impl SimMarketFeed {
    pub fn new(markets: Vec<ParsedWeatherMarket>, world: Arc<SimWorld>, interval_ms: u64) -> Self {
        let (tick_tx, _) = broadcast::channel(4096);
        let mut last_prices = HashMap::new();
        for market in &markets {
            last_prices.insert(market.yes_token_id.clone(), market.price_yes);
            last_prices.insert(market.no_token_id.clone(), market.price_no);
        }

        Self {
            tick_tx,
            world,
            markets,
            last_prices: RwLock::new(last_prices),
            interval_ms,
            chase: 0.15,
        }
    }

    /// Emit lagging price ticks until shutdown.
    #[instrument(skip(self, shutdown_rx), name = "sim_market_feed")]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut step: u64 = 0;
        let mut timer =
            tokio::time::interval(std::time::Duration::from_millis(self.interval_ms));

        info!(markets = self.markets.len(), "Sim market feed started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Sim market feed shutting down");
                    return Ok(());
                }
                _ = timer.tick() => {}
            }

            let now_ms = Utc::now().timestamp_millis() as u64;
            for (idx, market) in self.markets.iter().enumerate() {
                let fair_yes = self.world.fair_yes(&market.market_id);
                let wiggle = 0.004 * (step as f64 * 0.7 + idx as f64).sin();

                for (token_id, fair) in [
                    (&market.yes_token_id, fair_yes),
                    (&market.no_token_id, 1.0 - fair_yes),
                ] {
                    let price = {
                        let mut prices =
                            self.last_prices.write().expect("sim price lock poisoned");
                        let prev = prices.get(token_id).copied().unwrap_or(0.5);
                        let next = (prev + self.chase * (fair - prev) + wiggle).clamp(0.02, 0.98);
                        prices.insert(token_id.clone(), next);
                        next
                    };
                    let _ = self.tick_tx.send(PriceTick {
                        token_id: token_id.clone(),
                        price,
                        timestamp_ms: now_ms,
                    });
                }
            }
            step += 1;
        }
    }

    /// Current simulated price for a token, if tracked.
    pub fn last_price(&self, token_id: &TokenId) -> Option<f64> {
        self.last_prices
            .read()
            .expect("sim price lock poisoned")
            .get(token_id)
            .copied()
    }
}

#[async_trait]
impl MarketFeed for SimMarketFeed {
    fn subscribe(&self) -> broadcast::Receiver<PriceTick> {
        self.tick_tx.subscribe()
    }

    async fn order_book(&self, token_id: &TokenId) -> Result<Option<BookSnapshot>> {
        let Some(price) = self.last_price(token_id) else {
            return Ok(None);
        };
        Ok(Some(BookSnapshot {
            token_id: token_id.clone(),
            bids: vec![((price - BOOK_HALF_SPREAD).max(0.01), BOOK_DEPTH_USD)],
            asks: vec![((price + BOOK_HALF_SPREAD).min(0.99), BOOK_DEPTH_USD)],
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        }))
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Token held for a market side, used by the paper executor.
pub(super) fn token_for(market: &ParsedWeatherMarket, side: Side) -> &TokenId {
    match side {
        Side::Yes => &market.yes_token_id,
        Side::No => &market.no_token_id,
    }
}
