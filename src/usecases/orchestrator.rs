//! Strategy Orchestrator - Decision Cycle and Trade Lifecycle
//!
//! The main use case wiring everything together:
//! 1. Ingests price ticks and forecast updates into the market store
//! 2. Runs a periodic decision cycle (significant forecast changes can
//!    pre-empt it, subject to a debounce)
//! 3. Fans out to strategy detectors, ranks candidates by expected
//!    return x confidence, and feeds them through the risk gate
//! 4. Sizes and places entries, evaluates exits, and keeps the
//!    capital ledger and the decision log current
//!
//! Cycle errors are caught at the cycle boundary: one failed market
//! never takes the engine down, and cycle bookkeeping always completes.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::costs::CostModel;
use crate::domain::edge::{EdgeCalculator, EdgeRequest, GUARANTEED_PROBABILITY};
use crate::domain::kelly::KellySizer;
use crate::domain::types::{
  CalculatedEdge, CapturedOpportunity, ExitReason, ForecastSnapshot, MarketId,
  ParsedWeatherMarket, Position, Side,
};
use crate::domain::volatility::VolatilityClassifier;
use crate::ports::execution::OrderExecution;
use crate::ports::forecast_feed::{ForecastFeed, ForecastUpdate};
use crate::ports::market_feed::{MarketFeed, PriceTick};
use crate::ports::repository::{DecisionRecord, EngineSnapshot, Repository};

use super::entry_optimizer::EntryOptimizer;
use super::exit_optimizer::ExitOptimizer;
use super::market_store::MarketStateStore;
use super::risk_gate::PortfolioRiskGate;

/// Detector that produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
  /// Forecast-vs-price divergence above the cost-adjusted threshold.
  ForecastEdge,
  /// Forecast effectively locked in (probability at the guaranteed cap).
  GuaranteedOutcome,
}

impl Strategy {
  pub fn label(&self) -> &'static str {
    match self {
      Self::ForecastEdge => "forecast_edge",
      Self::GuaranteedOutcome => "guaranteed_outcome",
    }
  }

  fn all() -> [Strategy; 2] {
    [Self::ForecastEdge, Self::GuaranteedOutcome]
  }
}

/// Live performance tracking for one strategy.
///
/// History is bounded (oldest evicted); the weight is refreshed
/// periodically as a smoothed performance score with a floor so a cold
/// strategy is dampened, never silenced.
#[derive(Debug, Clone)]
pub struct StrategyStats {
  history: VecDeque<f64>,
  history_limit: usize,
  wins: u64,
  losses: u64,
  /// Signed run length: positive while winning, negative while losing.
  streak: i64,
  weight: f64,
}

impl StrategyStats {
  fn new(history_limit: usize) -> Self {
    Self {
      history: VecDeque::new(),
      history_limit,
      wins: 0,
      losses: 0,
      streak: 0,
      weight: 1.0,
    }
  }

  /// Record a realized trade outcome.
  pub fn record(&mut self, pnl: f64) {
    if self.history.len() == self.history_limit {
      self.history.pop_front();
    }
    self.history.push_back(pnl);

    if pnl > 0.0 {
      self.wins += 1;
      self.streak = if self.streak > 0 { self.streak + 1 } else { 1 };
    } else {
      self.losses += 1;
      self.streak = if self.streak < 0 { self.streak - 1 } else { -1 };
    }
  }

  /// Trades with a recorded outcome.
  pub fn trades(&self) -> u64 {
    self.wins + self.losses
  }

  /// Win rate over recorded trades; 0.5 with no history.
  pub fn win_rate(&self) -> f64 {
    let total = self.trades();
    if total == 0 {
      return 0.5;
    }
    self.wins as f64 / total as f64
  }

  /// Confidence multiplier: base weight with a hot bonus / cold penalty
  /// from the current streak, clamped to [0.5, 1.5].
  pub fn confidence_multiplier(&self) -> f64 {
    (self.weight + self.streak as f64 * 0.05).clamp(0.5, 1.5)
  }

  /// Smooth the weight towards the observed win rate, with a floor so
  /// every strategy keeps being sampled.
  fn refresh_weight(&mut self) {
    let score = 0.5 + self.win_rate();
    self.weight = (0.7 * self.weight + 0.3 * score).max(0.25);
  }
}

/// Engine-level counters published to the metrics layer via `watch`.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
  pub cycles_completed: u64,
  pub cycles_skipped: u64,
  pub cycle_errors: u64,
  pub preempted_cycles: u64,
  pub signals_detected: u64,
  pub entries_executed: u64,
  pub entries_rejected: u64,
  pub exits_executed: u64,
  pub exits_by_reason: HashMap<&'static str, u64>,
  pub rejections_by_reason: HashMap<&'static str, u64>,
  pub capital: f64,
  pub exposure: f64,
  pub heat: f64,
  pub drawdown: f64,
  pub open_positions: u64,
  pub kill_switch_active: bool,
}

/// One market's state captured under the store lock for the detectors.
struct MarketView {
  market: ParsedWeatherMarket,
  snapshot: ForecastSnapshot,
  price_yes: f64,
  price_no: f64,
  yes_velocity: f64,
  no_velocity: f64,
}

/// A ranked entry candidate out of the detector fan-out.
#[derive(Debug, Clone)]
struct Candidate {
  market: ParsedWeatherMarket,
  snapshot: ForecastSnapshot,
  edge: CalculatedEdge,
  strategy: Strategy,
  /// Velocity of the candidate side's price series.
  velocity: f64,
  score: f64,
}

/// Orchestrates the full decision loop over injected port adapters.
pub struct StrategyOrchestrator<F, FC, E, R>
where
  F: MarketFeed,
  FC: ForecastFeed,
  E: OrderExecution,
  R: Repository,
{
  feed: Arc<F>,
  forecasts: Arc<FC>,
  execution: Arc<E>,
  repository: Arc<R>,
  store: Arc<RwLock<MarketStateStore>>,
  edges: EdgeCalculator,
  entries: EntryOptimizer,
  exits: ExitOptimizer,
  gate: PortfolioRiskGate,
  volatility: VolatilityClassifier,
  positions: HashMap<MarketId, Position>,
  position_strategy: HashMap<MarketId, Strategy>,
  captured: HashMap<MarketId, CapturedOpportunity>,
  strategies: HashMap<Strategy, StrategyStats>,
  stats: EngineStats,
  stats_tx: watch::Sender<EngineStats>,
  config: AppConfig,
  cycle_running: bool,
  last_cycle: Option<Instant>,
  last_snapshot_ms: u64,
}

impl<F, FC, E, R> StrategyOrchestrator<F, FC, E, R>
where
  F: MarketFeed,
  FC: ForecastFeed,
  E: OrderExecution,
  R: Repository,
{
  /// Wire the orchestrator and register all active markets.
  pub fn new(
    feed: Arc<F>,
    forecasts: Arc<FC>,
    execution: Arc<E>,
    repository: Arc<R>,
    config: AppConfig,
    stats_tx: watch::Sender<EngineStats>,
  ) -> Self {
    let engine = &config.engine;
    let mut store = MarketStateStore::new(
      engine.price_retention_secs * 1_000,
      engine.velocity_window_secs * 1_000,
      engine.forecast_retention_hours * 3_600_000,
      config.trading.metric_significance_threshold,
    );
    for market in config.markets.iter().filter(|m| m.active) {
      store.register_market(market.to_parsed());
    }

    let kelly = KellySizer::new(config.trading.kelly_fraction);
    let costs = CostModel::new(
      config.trading.base_slippage,
      config.trading.slippage_per_1k,
      config.trading.spread_estimate,
      config.trading.safety_margins.clone(),
    );
    let edges = EdgeCalculator::new(
      config.trading.min_edge_threshold,
      config.trading.global_min_edge,
      kelly,
      costs.clone(),
    );
    let entries = EntryOptimizer::new(config.entry.clone(), costs);
    let exits = ExitOptimizer::new(config.exit.clone());
    let gate = PortfolioRiskGate::new(&config.risk);

    let strategies = Strategy::all()
      .into_iter()
      .map(|s| (s, StrategyStats::new(engine.strategy_history_limit)))
      .collect();

    Self {
      feed,
      forecasts,
      execution,
      repository,
      store: Arc::new(RwLock::new(store)),
      edges,
      entries,
      exits,
      gate,
      volatility: VolatilityClassifier::default(),
      positions: HashMap::new(),
      position_strategy: HashMap::new(),
      captured: HashMap::new(),
      strategies,
      stats: EngineStats::default(),
      stats_tx,
      config,
      cycle_running: false,
      last_cycle: None,
      last_snapshot_ms: 0,
    }
  }

  /// Shared handle to the market store (read-only consumers).
  pub fn store(&self) -> Arc<RwLock<MarketStateStore>> {
    Arc::clone(&self.store)
  }

  /// Run the ingestion + decision loop until shutdown.
  #[instrument(skip(self, shutdown_rx), name = "strategy_loop")]
  pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let markets = self.store.read().await.len();
    if markets == 0 {
      warn!("No active markets configured, engine idle");
      let _ = shutdown_rx.recv().await;
      return Ok(());
    }

    if let Err(e) = self.report_prior_state().await {
      warn!(error = %e, "Could not read prior engine snapshot");
    }

    let mut price_rx = self.feed.subscribe();
    let mut forecast_rx = self.forecasts.subscribe();
    let mut cycle_timer = tokio::time::interval(std::time::Duration::from_secs(
      self.config.engine.cycle_interval_secs,
    ));
    cycle_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(markets, dry_run = self.config.bot.dry_run, "Strategy orchestrator started");

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Shutdown signal received, stopping orchestrator");
          break;
        }
        _ = cycle_timer.tick() => {
          self.run_cycle(false).await;
        }
        tick = price_rx.recv() => match tick {
          Ok(tick) => self.handle_tick(&tick).await,
          Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!(missed = n, "Price feed lagging, ticks dropped");
          }
          Err(broadcast::error::RecvError::Closed) => {
            warn!("Price feed closed, stopping orchestrator");
            break;
          }
        },
        update = forecast_rx.recv() => match update {
          Ok(update) => {
            if self.handle_forecast(&update).await {
              self.maybe_preempt().await;
            }
          }
          Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!(missed = n, "Forecast feed lagging, updates dropped");
          }
          Err(broadcast::error::RecvError::Closed) => {
            warn!("Forecast feed closed, stopping orchestrator");
            break;
          }
        },
      }
    }

    self.shutdown_sequence().await;
    Ok(())
  }

  /// Apply a price tick and mark any open position in that market.
  async fn handle_tick(&mut self, tick: &PriceTick) {
    let mut store = self.store.write().await;
    if !store.update_price(&tick.token_id, tick.price, tick.timestamp_ms) {
      return;
    }

    if let Some((market_id, side)) = store.resolve_token(&tick.token_id).cloned() {
      if let Some(position) = self.positions.get_mut(&market_id) {
        if position.side == side {
          position.update_price(tick.price);
        }
      }
    }
  }

  /// Apply a forecast update; true when it registered a significant change.
  async fn handle_forecast(&mut self, update: &ForecastUpdate) -> bool {
    let snapshot = self.store.write().await.update_forecast(
      &update.market_id,
      update.forecast_value,
      update.probability,
      update.sigma,
      update.timestamp_ms,
    );

    match snapshot {
      Some(snap) if snap.value_changed => {
        info!(
          market = %update.market_id,
          value = update.forecast_value,
          change = snap.change_amount,
          "Significant forecast change"
        );
        true
      }
      _ => false,
    }
  }

  /// Pre-empt the cycle timer on a significant change, debounced.
  async fn maybe_preempt(&mut self) {
    let debounce = std::time::Duration::from_secs(self.config.engine.debounce_secs);
    let elapsed_enough = self.last_cycle.is_none_or(|t| t.elapsed() >= debounce);
    if elapsed_enough {
      debug!("Forecast change pre-empting decision cycle");
      self.run_cycle(true).await;
    } else {
      debug!("Forecast change within debounce window, next cycle will pick it up");
    }
  }

  /// Run one decision cycle. Errors are contained at this boundary.
  async fn run_cycle(&mut self, preempted: bool) {
    if self.cycle_running {
      self.stats.cycles_skipped += 1;
      warn!("Cycle already in progress, skipping");
      return;
    }
    self.cycle_running = true;
    let started = Instant::now();
    let now_ms = Utc::now().timestamp_millis() as u64;

    if let Err(e) = self.cycle_inner(now_ms).await {
      self.stats.cycle_errors += 1;
      warn!(error = %e, "Decision cycle failed");
    }

    self.stats.cycles_completed += 1;
    if preempted {
      self.stats.preempted_cycles += 1;
    }
    if self.stats.cycles_completed % self.config.engine.weight_refresh_cycles == 0 {
      self.refresh_weights();
    }
    self.maybe_snapshot(now_ms).await;
    self.publish_stats(now_ms);

    self.last_cycle = Some(Instant::now());
    self.cycle_running = false;
    debug!(
      duration_ms = started.elapsed().as_millis() as u64,
      preempted,
      "Decision cycle complete"
    );
  }

  async fn cycle_inner(&mut self, now_ms: u64) -> Result<()> {
    self.evaluate_exits(now_ms).await;

    let mut candidates = self.detect_candidates(now_ms).await;
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    for candidate in candidates {
      self.try_enter(&candidate, now_ms).await;
    }
    Ok(())
  }

  /// Fan out the detectors over the store and reconcile their signals.
  async fn detect_candidates(&mut self, now_ms: u64) -> Vec<Candidate> {
    let views: Vec<MarketView> = {
      let store = self.store.read().await;
      store
        .markets()
        .filter_map(|state| {
          let snapshot = state.last_forecast.clone()?;
          Some(MarketView {
            market: state.market.clone(),
            snapshot,
            price_yes: state.price(Side::Yes),
            price_no: state.price(Side::No),
            yes_velocity: state.yes.velocity_per_sec(),
            no_velocity: state.no.velocity_per_sec(),
          })
        })
        .collect()
    };

    let size_hint = (self.gate.capital() * self.config.risk.max_position_fraction)
      .min(self.config.entry.max_position_notional);

    // Each detector scans every view independently; reconciliation
    // keeps the best-scoring candidate per market.
    let mut best: HashMap<MarketId, Candidate> = HashMap::new();
    for strategy in Strategy::all() {
      for candidate in self.run_detector(strategy, &views, size_hint, now_ms) {
        match best.entry(candidate.market.market_id.clone()) {
          Entry::Occupied(mut slot) => {
            if candidate.score > slot.get().score {
              slot.insert(candidate);
            }
          }
          Entry::Vacant(slot) => {
            slot.insert(candidate);
          }
        }
      }
    }
    best.into_values().collect()
  }

  /// Run one detector over the captured market views.
  fn run_detector(
    &mut self,
    strategy: Strategy,
    views: &[MarketView],
    size_hint: f64,
    now_ms: u64,
  ) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for view in views {
      let Some(edge) = self.detect_one(strategy, view, size_hint) else {
        continue;
      };
      self.stats.signals_detected += 1;

      let multiplier = self
        .strategies
        .get(&strategy)
        .map_or(1.0, StrategyStats::confidence_multiplier);

      let velocity = match edge.side {
        Side::Yes => view.yes_velocity,
        Side::No => view.no_velocity,
      };
      let score = candidate_score(
        &edge,
        multiplier,
        view.snapshot.change_timestamp_ms,
        now_ms,
        self.config.entry.urgency_tau_secs,
      );

      debug!(
        market = %edge.market_id,
        strategy = strategy.label(),
        side = %edge.side,
        adjusted_edge = edge.adjusted_edge,
        score,
        "Signal detected"
      );

      candidates.push(Candidate {
        market: view.market.clone(),
        snapshot: view.snapshot.clone(),
        edge,
        strategy,
        velocity,
        score,
      });
    }
    candidates
  }

  /// One detector on one market: emit an edge or pass.
  ///
  /// The forecast-edge detector looks for a cost-adjusted divergence on
  /// live probabilities; the guaranteed-outcome detector only wakes up
  /// when the forecast has effectively locked the result in. Each
  /// ignores the other's territory.
  fn detect_one(
    &self,
    strategy: Strategy,
    view: &MarketView,
    size_hint: f64,
  ) -> Option<CalculatedEdge> {
    let p = view.snapshot.probability;
    let locked = p >= GUARANTEED_PROBABILITY || p <= 1.0 - GUARANTEED_PROBABILITY;
    match strategy {
      Strategy::ForecastEdge if locked => return None,
      Strategy::GuaranteedOutcome if !locked => return None,
      _ => {}
    }

    let request = EdgeRequest {
      market_id: view.market.market_id.clone(),
      forecast_probability: p,
      price_yes: view.price_yes,
      price_no: view.price_no,
      sigma: view.snapshot.sigma,
      trade_size_usd: size_hint,
      skip_costs: false,
      confidence: detector_confidence(view.snapshot.sigma),
    };
    self.edges.calculate(&request)
  }

  /// Attempt one candidate: dedup, size, admit, place, record.
  async fn try_enter(&mut self, candidate: &Candidate, now_ms: u64) {
    let market_id = &candidate.edge.market_id;

    if self.positions.contains_key(market_id) {
      return;
    }

    // A captured opportunity blocks re-entry until the forecast has
    // moved by at least the re-entry delta.
    if let Some(captured) = self.captured.get(market_id) {
      let moved = (candidate.snapshot.forecast_value - captured.forecast_value).abs();
      if moved < self.config.trading.reentry_delta {
        debug!(market = %market_id, moved, "Opportunity already captured, skipping");
        return;
      }
    }

    let token_id = match candidate.edge.side {
      Side::Yes => &candidate.market.yes_token_id,
      Side::No => &candidate.market.no_token_id,
    };
    let book = match self.feed.order_book(token_id).await {
      Ok(book) => book,
      Err(e) => {
        warn!(market = %market_id, error = %e, "Order book fetch failed, sizing without book");
        None
      }
    };

    let regime = self.volatility.classify(candidate.velocity);
    // Ceiling the plan at what the gate could actually admit.
    let max_notional = (self.gate.capital() * self.config.risk.max_position_fraction)
      .min(self.config.entry.max_position_notional);
    let signal = self.entries.plan_entry(
      &candidate.edge,
      book.as_ref(),
      regime,
      self.gate.capital(),
      max_notional,
      candidate.snapshot.change_timestamp_ms,
      now_ms,
    );
    if signal.size_usd <= 0.0 {
      return;
    }

    if self
      .gate
      .can_admit(
        market_id,
        signal.size_usd,
        candidate.edge.kelly_fraction,
        &candidate.market.event_key,
        now_ms,
      )
      .is_err()
    {
      return;
    }

    let fill = match self.execution.place_entry(&signal).await {
      Ok(fill) => fill,
      Err(e) => {
        warn!(market = %market_id, error = %e, "Entry placement failed");
        return;
      }
    };
    if !fill.accepted {
      self.stats.entries_rejected += 1;
      info!(
        market = %market_id,
        reason = fill.rejection_reason.as_deref().unwrap_or("unknown"),
        "Entry rejected by exchange"
      );
      return;
    }

    let position = Position::open(
      market_id.clone(),
      candidate.edge.side,
      fill.fill_price,
      fill.filled_size_usd,
      Utc::now(),
    );
    self.gate.record_open(
      market_id,
      fill.filled_size_usd,
      candidate.edge.kelly_fraction,
      &candidate.market.event_key,
    );
    self.positions.insert(market_id.clone(), position);
    self.position_strategy.insert(market_id.clone(), candidate.strategy);
    self.captured.insert(
      market_id.clone(),
      CapturedOpportunity {
        forecast_value: candidate.snapshot.forecast_value,
        captured_at_ms: now_ms,
      },
    );
    self.stats.entries_executed += 1;

    info!(
      market = %market_id,
      strategy = candidate.strategy.label(),
      side = %candidate.edge.side,
      size = fill.filled_size_usd,
      price = fill.fill_price,
      edge = candidate.edge.adjusted_edge,
      guaranteed = candidate.edge.is_guaranteed,
      "Position opened"
    );

    let record = DecisionRecord {
      id: uuid::Uuid::new_v4().to_string(),
      market_id: market_id.clone(),
      kind: "entry".to_string(),
      side: candidate.edge.side.to_string(),
      strategy: Some(candidate.strategy.label().to_string()),
      exit_reason: None,
      price: fill.fill_price,
      size_usd: fill.filled_size_usd,
      adjusted_edge: Some(candidate.edge.adjusted_edge),
      kelly_fraction: Some(candidate.edge.kelly_fraction),
      realized_pnl: None,
      timestamp_ms: now_ms,
    };
    if let Err(e) = self.repository.save_decision(&record).await {
      warn!(error = %e, "Failed to persist entry decision");
    }
  }

  /// Evaluate every open position against the exit state machine.
  async fn evaluate_exits(&mut self, now_ms: u64) {
    struct ExitView {
      market_id: MarketId,
      mark_price: Option<f64>,
      regime: crate::domain::types::MarketRegime,
      fair_value: Option<f64>,
    }

    let views: Vec<ExitView> = {
      let store = self.store.read().await;
      self
        .positions
        .values()
        .map(|position| {
          let state = store.market(&position.market_id);
          let mark_price = state.map(|s| s.price(position.side));
          let regime = state.map_or(crate::domain::types::MarketRegime::Unknown, |s| {
            self.volatility.classify_market(s.history(position.side).points())
          });
          let fair_value = state.and_then(|s| s.last_forecast.as_ref()).map(|f| {
            ExitOptimizer::held_fair_value(position.side, f.probability)
          });
          ExitView { market_id: position.market_id.clone(), mark_price, regime, fair_value }
        })
        .collect()
    };

    let now = Utc::now();
    for view in views {
      let Some(position) = self.positions.get_mut(&view.market_id) else {
        continue;
      };
      if let Some(price) = view.mark_price {
        position.update_price(price);
      }

      let position = position.clone();
      let Some(decision) = self.exits.evaluate(&position, view.regime, view.fair_value, now)
      else {
        continue;
      };

      let close_size = position.size_usd * decision.fraction;
      let fill = match self
        .execution
        .close_position(&view.market_id, position.side, close_size, decision.reason)
        .await
      {
        Ok(fill) => fill,
        Err(e) => {
          warn!(market = %view.market_id, error = %e, "Close placement failed");
          continue;
        }
      };
      if !fill.accepted {
        info!(
          market = %view.market_id,
          reason = fill.rejection_reason.as_deref().unwrap_or("unknown"),
          "Close rejected by exchange"
        );
        continue;
      }

      self.settle_close(&view.market_id, &position, decision.is_full(), &fill, decision.reason, now_ms)
        .await;
    }
  }

  /// Book a fill against the ledger, the stats, and the decision log.
  async fn settle_close(
    &mut self,
    market_id: &MarketId,
    position: &Position,
    is_full: bool,
    fill: &crate::ports::execution::CloseFill,
    reason: ExitReason,
    now_ms: u64,
  ) {
    let strategy = self.position_strategy.get(market_id).copied();
    if is_full {
      self.gate.record_close(market_id, fill.realized_pnl, now_ms);
      self.positions.remove(market_id);
      self.exits.clear(market_id);
      self.position_strategy.remove(market_id);
      if let Some(stats) = strategy.and_then(|s| self.strategies.get_mut(&s)) {
        stats.record(fill.realized_pnl);
      }
    } else {
      // The partial flag commits only on an accepted fill; a rejected
      // close keeps the same partial on offer next cycle.
      self.exits.confirm_partial(market_id, reason);
      self
        .gate
        .record_partial_close(market_id, fill.closed_size_usd, fill.realized_pnl, now_ms);
      if let Some(open) = self.positions.get_mut(market_id) {
        open.size_usd = (open.size_usd - fill.closed_size_usd).max(0.0);
      }
    }

    self.stats.exits_executed += 1;
    *self.stats.exits_by_reason.entry(reason.label()).or_insert(0) += 1;

    info!(
      market = %market_id,
      reason = reason.label(),
      full = is_full,
      closed = fill.closed_size_usd,
      pnl = fill.realized_pnl,
      capital = self.gate.capital(),
      "Position closed"
    );

    let record = DecisionRecord {
      id: uuid::Uuid::new_v4().to_string(),
      market_id: market_id.clone(),
      kind: "exit".to_string(),
      side: position.side.to_string(),
      strategy: strategy.map(|s| s.label().to_string()),
      exit_reason: Some(reason.label().to_string()),
      price: fill.close_price,
      size_usd: fill.closed_size_usd,
      adjusted_edge: None,
      kelly_fraction: None,
      realized_pnl: Some(fill.realized_pnl),
      timestamp_ms: now_ms,
    };
    if let Err(e) = self.repository.save_decision(&record).await {
      warn!(error = %e, "Failed to persist exit decision");
    }
  }

  fn refresh_weights(&mut self) {
    for (strategy, stats) in &mut self.strategies {
      stats.refresh_weight();
      debug!(
        strategy = strategy.label(),
        weight = stats.weight,
        win_rate = stats.win_rate(),
        trades = stats.trades(),
        "Strategy weight refreshed"
      );
    }
  }

  /// Persist an engine snapshot on the configured interval.
  async fn maybe_snapshot(&mut self, now_ms: u64) {
    let interval_ms = self.config.persistence.snapshot_interval_seconds * 1_000;
    if now_ms.saturating_sub(self.last_snapshot_ms) < interval_ms {
      return;
    }
    self.last_snapshot_ms = now_ms;

    let snapshot = self.build_snapshot(now_ms);
    if let Err(e) = self.repository.save_snapshot(&snapshot).await {
      warn!(error = %e, "Failed to persist engine snapshot");
    }
  }

  fn build_snapshot(&self, now_ms: u64) -> EngineSnapshot {
    EngineSnapshot {
      version: env!("CARGO_PKG_VERSION").to_string(),
      timestamp_ms: now_ms,
      capital: self.gate.capital(),
      peak_capital: self.gate.peak_capital(),
      positions: self
        .positions
        .values()
        .map(|p| (p.market_id.clone(), p.side.to_string(), p.entry_price, p.size_usd))
        .collect(),
      kill_switch_active: self.gate.kill_switch_active(now_ms),
      cycles_completed: self.stats.cycles_completed,
    }
  }

  /// Surface any prior run's final state for the operator.
  ///
  /// Capital is never restored automatically: the configured starting
  /// capital is authoritative, and a divergence is worth a warning.
  async fn report_prior_state(&self) -> Result<()> {
    let Some(snapshot) = self
      .repository
      .load_latest_snapshot()
      .await
      .context("loading latest snapshot")?
    else {
      return Ok(());
    };

    info!(
      prior_capital = snapshot.capital,
      prior_positions = snapshot.positions.len(),
      prior_cycles = snapshot.cycles_completed,
      "Prior engine snapshot found"
    );
    if (snapshot.capital - self.gate.capital()).abs() > f64::EPSILON {
      warn!(
        prior = snapshot.capital,
        configured = self.gate.capital(),
        "Configured capital differs from last recorded state"
      );
    }
    if !snapshot.positions.is_empty() {
      warn!(
        count = snapshot.positions.len(),
        "Prior run left open positions, reconcile manually"
      );
    }
    Ok(())
  }

  /// Graceful teardown: close everything, snapshot, summarize.
  async fn shutdown_sequence(&mut self) {
    let now_ms = Utc::now().timestamp_millis() as u64;

    let open: Vec<Position> = self.positions.values().cloned().collect();
    for position in open {
      let fill = match self
        .execution
        .close_position(&position.market_id, position.side, position.size_usd, ExitReason::TimeLimit)
        .await
      {
        Ok(fill) if fill.accepted => fill,
        Ok(fill) => {
          warn!(
            market = %position.market_id,
            reason = fill.rejection_reason.as_deref().unwrap_or("unknown"),
            "Shutdown close rejected, position left open"
          );
          continue;
        }
        Err(e) => {
          warn!(market = %position.market_id, error = %e, "Shutdown close failed");
          continue;
        }
      };
      let market_id = position.market_id.clone();
      self
        .settle_close(&market_id, &position, true, &fill, ExitReason::TimeLimit, now_ms)
        .await;
    }

    let snapshot = self.build_snapshot(now_ms);
    if let Err(e) = self.repository.save_snapshot(&snapshot).await {
      warn!(error = %e, "Failed to persist final snapshot");
    }

    info!(
      cycles = self.stats.cycles_completed,
      entries = self.stats.entries_executed,
      exits = self.stats.exits_executed,
      capital = self.gate.capital(),
      drawdown = self.gate.drawdown(),
      "Orchestrator stopped"
    );
  }

  fn publish_stats(&mut self, now_ms: u64) {
    self.stats.capital = self.gate.capital();
    self.stats.exposure = self.gate.exposure();
    self.stats.heat = self.gate.heat();
    self.stats.drawdown = self.gate.drawdown();
    self.stats.open_positions = self.positions.len() as u64;
    self.stats.kill_switch_active = self.gate.kill_switch_active(now_ms);
    self.stats.rejections_by_reason = self.gate.rejection_counts();
    let _ = self.stats_tx.send(self.stats.clone());
  }
}

/// Sigma-tiered confidence for the forecast-edge detector.
fn detector_confidence(sigma: Option<f64>) -> f64 {
  match sigma {
    Some(s) if s >= 3.0 => 0.9,
    Some(s) if s >= 2.0 => 0.75,
    _ => 0.6,
  }
}

/// Expected return x confidence, time-decayed by signal age.
fn candidate_score(
  edge: &CalculatedEdge,
  strategy_multiplier: f64,
  change_timestamp_ms: u64,
  now_ms: u64,
  tau_secs: f64,
) -> f64 {
  let age_secs = now_ms.saturating_sub(change_timestamp_ms) as f64 / 1000.0;
  let decay = (-age_secs / tau_secs).exp().max(0.05);
  edge.adjusted_edge * decay * edge.confidence * strategy_multiplier
}
