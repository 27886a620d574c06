//! Paper Executor - Simulated Order Execution
//!
//! Implements the `OrderExecution` port with paper fills against the
//! simulated book. Mirrors real exchange behavior where it matters to
//! the engine: limit orders reject when the market has drifted past the
//! limit plus tolerance, closes reject when there is no matching lot,
//! and realized PnL is computed from the actual paper entry price.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::feed::{token_for, SimMarketFeed};
use crate::domain::types::{
    EntrySignal, ExitReason, MarketId, OrderType, ParsedWeatherMarket, Side,
};
use crate::ports::execution::{CloseFill, EntryFill, OrderExecution};
use crate::ports::market_feed::MarketFeed;

/// One open paper lot.
#[derive(Debug, Clone, Copy)]
struct PaperLot {
    entry_price: f64,
    size_usd: f64,
}

/// Paper-trading executor backed by the simulated market feed.
pub struct PaperExecutor {
    feed: Arc<SimMarketFeed>,
    /// (market, side) -> held token, from the registered markets.
    tokens: HashMap<(MarketId, Side), String>,
    lots: Mutex<HashMap<(MarketId, Side), PaperLot>>,
    /// Allowed adverse move past a limit price before rejecting.
    drift_tolerance: f64,
}

impl PaperExecutor {
    pub fn new(feed: Arc<SimMarketFeed>, markets: &[ParsedWeatherMarket]) -> Self {
        let mut tokens = HashMap::new();
        for market in markets {
            for side in [Side::Yes, Side::No] {
                tokens.insert(
                    (market.market_id.clone(), side),
                    token_for(market, side).clone(),
                );
            }
        }

        Self {
            feed,
            tokens,
            lots: Mutex::new(HashMap::new()),
            drift_tolerance: 0.02,
        }
    }

    fn reject_entry(reason: &str) -> EntryFill {
        EntryFill {
            accepted: false,
            filled_size_usd: 0.0,
            fill_price: 0.0,
            rejection_reason: Some(reason.to_string()),
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        }
    }

    fn reject_close(reason: &str) -> CloseFill {
        CloseFill {
            accepted: false,
            closed_size_usd: 0.0,
            close_price: 0.0,
            realized_pnl: 0.0,
            rejection_reason: Some(reason.to_string()),
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        }
    }
}

#[async_trait]
impl OrderExecution for PaperExecutor {
    #[instrument(skip(self, signal), fields(market = %signal.market_id, side = %signal.side))]
    async fn place_entry(&self, signal: &EntrySignal) -> Result<EntryFill> {
        let key = (signal.market_id.clone(), signal.side);
        let Some(token_id) = self.tokens.get(&key) else {
            warn!("Entry for unregistered market");
            return Ok(Self::reject_entry("unknown market"));
        };

        let book = self.feed.order_book(token_id).await?;
        let Some(ask) = book.as_ref().and_then(|b| b.best_ask()) else {
            return Ok(Self::reject_entry("no liquidity"));
        };

        let fill_price = match signal.order_type {
            OrderType::Market => {
                let price = (ask * (1.0 + signal.expected_slippage)).min(0.99);
                if price >= 0.99 {
                    return Ok(Self::reject_entry("price at cap, no edge left"));
                }
                price
            }
            OrderType::Limit => {
                let limit = signal.price_limit.unwrap_or(ask);
                if ask > limit + self.drift_tolerance {
                    debug!(ask, limit, "Limit order rejected, price drifted");
                    return Ok(Self::reject_entry("price drifted past limit"));
                }
                ask.min(limit)
            }
        };

        {
            let mut lots = self.lots.lock().expect("paper lots lock poisoned");
            if lots.contains_key(&key) {
                return Ok(Self::reject_entry("lot already open"));
            }
            lots.insert(
                key,
                PaperLot {
                    entry_price: fill_price,
                    size_usd: signal.size_usd,
                },
            );
        }

        info!(
            price = fill_price,
            size = signal.size_usd,
            order_type = ?signal.order_type,
            "Paper entry filled"
        );

        Ok(EntryFill {
            accepted: true,
            filled_size_usd: signal.size_usd,
            fill_price,
            rejection_reason: None,
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        })
    }

    #[instrument(skip(self), fields(market = %market_id, side = %side))]
    async fn close_position(
        &self,
        market_id: &MarketId,
        side: Side,
        size_usd: f64,
        reason: ExitReason,
    ) -> Result<CloseFill> {
        let key = (market_id.clone(), side);
        let Some(token_id) = self.tokens.get(&key) else {
            return Ok(Self::reject_close("unknown market"));
        };

        let lot = {
            let lots = self.lots.lock().expect("paper lots lock poisoned");
            lots.get(&key).copied()
        };
        let Some(lot) = lot else {
            return Ok(Self::reject_close("no open lot"));
        };

        let book = self.feed.order_book(token_id).await?;
        let close_price = book
            .as_ref()
            .and_then(|b| b.best_bid())
            .unwrap_or(lot.entry_price);

        let closed = size_usd.min(lot.size_usd);
        let realized_pnl = if lot.entry_price > 0.0 {
            closed * (close_price - lot.entry_price) / lot.entry_price
        } else {
            0.0
        };

        {
            let mut lots = self.lots.lock().expect("paper lots lock poisoned");
            if closed >= lot.size_usd {
                lots.remove(&key);
            } else if let Some(open) = lots.get_mut(&key) {
                open.size_usd -= closed;
            }
        }

        info!(
            price = close_price,
            closed,
            pnl = realized_pnl,
            reason = reason.label(),
            "Paper close filled"
        );

        Ok(CloseFill {
            accepted: true,
            closed_size_usd: closed,
            close_price,
            realized_pnl,
            rejection_reason: None,
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        })
    }

    async fn is_healthy(&self) -> bool {
        self.feed.is_healthy().await
    }
}
