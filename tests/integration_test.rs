//! Integration Tests - End-to-end Engine Component Testing
//!
//! Tests the interaction between usecases, ports, and mock adapters.
//! Uses mockall for trait mocking and tokio::test for async tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use mockall::mock;
use tokio::sync::{broadcast, watch};

use weather_arb_bot::adapters::sim::feed::{ForecastScript, SimForecastFeed, SimMarketFeed};
use weather_arb_bot::adapters::sim::SimWorld;
use weather_arb_bot::config::{
    AppConfig, BotConfig, EngineConfig, EntryConfig, ExitConfig, MarketConfig, MetricsConfig,
    PersistenceConfig, RegimeExitConfig, RiskConfig, TradingConfig,
};
use weather_arb_bot::domain::costs::SafetyMarginTiers;
use weather_arb_bot::domain::types::{
    ComparisonType, EntrySignal, ExitReason, MarketId, ParsedWeatherMarket, Side,
};
use weather_arb_bot::ports::execution::{CloseFill, EntryFill};
use weather_arb_bot::ports::repository::{DecisionRecord, EngineSnapshot};
use weather_arb_bot::usecases::orchestrator::{EngineStats, StrategyOrchestrator};

// ---- Mock Definitions ----

mock! {
    pub OrderExec {}

    #[async_trait::async_trait]
    impl weather_arb_bot::ports::execution::OrderExecution for OrderExec {
        async fn place_entry(&self, signal: &EntrySignal) -> anyhow::Result<EntryFill>;

        async fn close_position(
            &self,
            market_id: &MarketId,
            side: Side,
            size_usd: f64,
            reason: ExitReason,
        ) -> anyhow::Result<CloseFill>;

        async fn is_healthy(&self) -> bool;
    }
}

mock! {
    pub Repo {}

    #[async_trait::async_trait]
    impl weather_arb_bot::ports::repository::Repository for Repo {
        async fn save_decision(&self, record: &DecisionRecord) -> anyhow::Result<()>;
        async fn load_decisions(&self) -> anyhow::Result<Vec<DecisionRecord>>;
        async fn save_snapshot(&self, snapshot: &EngineSnapshot) -> anyhow::Result<()>;
        async fn load_latest_snapshot(&self) -> anyhow::Result<Option<EngineSnapshot>>;
        async fn is_healthy(&self) -> bool;
    }
}

// ---- Fixtures ----

fn test_market(id: &str, event_key: &str) -> MarketConfig {
    MarketConfig {
        name: format!("Will {id} high temp exceed 90F?"),
        market_id: id.to_string(),
        yes_token_id: format!("{id}-yes"),
        no_token_id: format!("{id}-no"),
        threshold: 90.0,
        comparison: ComparisonType::Above,
        event_key: event_key.to_string(),
        target_date: Utc.with_ymd_and_hms(2026, 7, 4, 0, 0, 0).unwrap(),
        price_yes: 0.5,
        price_no: 0.5,
        active: true,
    }
}

fn regime(tp: f64, sl: f64) -> RegimeExitConfig {
    RegimeExitConfig {
        take_profit_pct: tp,
        stop_loss_pct: sl,
        trailing_enabled: true,
        partial_enabled: true,
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        bot: BotConfig {
            name: "test-bot".to_string(),
            log_level: "warn".to_string(),
            dry_run: true,
        },
        markets: vec![test_market("nyc-90f", "nyc")],
        trading: TradingConfig {
            min_edge_threshold: 0.05,
            global_min_edge: 0.02,
            kelly_fraction: 0.25,
            base_slippage: 0.01,
            slippage_per_1k: 0.005,
            spread_estimate: 0.02,
            safety_margins: SafetyMarginTiers::default(),
            metric_significance_threshold: 1.0,
            reentry_delta: 1.0,
        },
        entry: EntryConfig {
            max_position_notional: 140.0,
            scale_in_threshold_usd: 500.0,
            scale_in_tranches: 3,
            tranche_delay_ms: 100,
            urgency_tau_secs: 120.0,
            market_order_cutoff: 0.8,
            limit_price_buffer: 0.01,
            guaranteed_position_multiplier: 1.5,
        },
        exit: ExitConfig {
            trending: regime(20.0, -10.0),
            ranging: regime(10.0, -5.0),
            volatile: regime(30.0, -15.0),
            unknown: regime(15.0, -7.5),
            trailing_activation_pct: 10.0,
            trailing_offset_pct: 5.0,
            partial_fraction: 0.5,
            max_hold_hours: 12,
            fair_value_margin_pct: 1.0,
        },
        risk: RiskConfig {
            starting_capital: 1_000.0,
            max_position_fraction: 0.15,
            max_portfolio_exposure: 0.50,
            min_cash_reserve: 0.10,
            max_kelly_heat: 0.30,
            max_correlated_exposure: 0.20,
            circuit_breaker_losses: 5,
            max_drawdown_fraction: 0.15,
            cooldown_seconds: 1800,
        },
        engine: EngineConfig {
            cycle_interval_secs: 1,
            debounce_secs: 0,
            price_retention_secs: 600,
            forecast_retention_hours: 24,
            velocity_window_secs: 60,
            strategy_history_limit: 200,
            weight_refresh_cycles: 20,
        },
        metrics: MetricsConfig {
            enabled: false,
            bind_address: "127.0.0.1:0".to_string(),
            health_port: 0,
        },
        persistence: PersistenceConfig {
            data_dir: "target/test-data".to_string(),
            snapshot_interval_seconds: 3600,
        },
    }
}

fn parsed_markets(config: &AppConfig) -> Vec<ParsedWeatherMarket> {
    config.markets.iter().map(|m| m.to_parsed()).collect()
}

/// Sim feeds with a scripted forecast jump that creates a clear edge.
fn sim_feeds(
    config: &AppConfig,
    forecast_interval_ms: u64,
) -> (Arc<SimMarketFeed>, Arc<SimForecastFeed>) {
    let markets = parsed_markets(config);
    let world = Arc::new(SimWorld::new());
    let scripts = markets
        .iter()
        .map(|m| ForecastScript {
            market_id: m.market_id.clone(),
            start_value: m.threshold - 2.0,
            end_value: m.threshold + 4.0,
            steps: 3,
        })
        .collect();
    let market_feed = Arc::new(SimMarketFeed::new(markets.clone(), Arc::clone(&world), 100));
    let forecast_feed = Arc::new(SimForecastFeed::new(
        markets,
        scripts,
        world,
        forecast_interval_ms,
    ));
    (market_feed, forecast_feed)
}

// ---- Tests ----

/// A sharp forecast move must flow through detection, admission, and
/// execution: the engine opens a position and logs the entry decision.
#[tokio::test]
async fn test_forecast_jump_triggers_entry() {
    let config = test_config();
    let (market_feed, forecast_feed) = sim_feeds(&config, 200);

    let mut exec = MockOrderExec::new();
    exec.expect_place_entry().times(1..).returning(|signal| {
        Ok(EntryFill {
            accepted: true,
            filled_size_usd: signal.size_usd,
            fill_price: 0.55,
            rejection_reason: None,
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        })
    });
    // Shutdown closes whatever was opened.
    exec.expect_close_position().returning(|_, _, size, _| {
        Ok(CloseFill {
            accepted: true,
            closed_size_usd: size,
            close_price: 0.60,
            realized_pnl: size * 0.05,
            rejection_reason: None,
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        })
    });
    exec.expect_is_healthy().returning(|| true);

    let mut repo = MockRepo::new();
    repo.expect_load_latest_snapshot().returning(|| Ok(None));
    repo
        .expect_save_decision()
        .withf(|record| record.kind == "entry")
        .times(1..)
        .returning(|_| Ok(()));
    repo
        .expect_save_decision()
        .withf(|record| record.kind == "exit")
        .returning(|_| Ok(()));
    repo.expect_save_snapshot().returning(|_| Ok(()));
    repo.expect_is_healthy().returning(|| true);

    let (shutdown_tx, _) = broadcast::channel(1);
    let (stats_tx, stats_rx) = watch::channel(EngineStats::default());

    let feed_task = tokio::spawn({
        let feed = Arc::clone(&market_feed);
        let rx = shutdown_tx.subscribe();
        async move { feed.run(rx).await }
    });
    let forecast_task = tokio::spawn({
        let feed = Arc::clone(&forecast_feed);
        let rx = shutdown_tx.subscribe();
        async move { feed.run(rx).await }
    });

    let mut orchestrator = StrategyOrchestrator::new(
        market_feed,
        forecast_feed,
        Arc::new(exec),
        Arc::new(repo),
        config,
        stats_tx,
    );
    let engine_shutdown = shutdown_tx.subscribe();
    let engine_task = tokio::spawn(async move { orchestrator.run(engine_shutdown).await });

    // Let the scenario play out for a few cycles.
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    shutdown_tx.send(()).unwrap();

    engine_task.await.unwrap().unwrap();
    let _ = feed_task.await;
    let _ = forecast_task.await;

    let stats = stats_rx.borrow().clone();
    assert!(stats.signals_detected > 0, "no signals detected");
    assert!(stats.entries_executed > 0, "no entries executed");
    assert!(stats.cycles_completed > 0);
}

/// Exchange rejections must not corrupt the ledger: no position, no
/// exposure, and the engine keeps cycling.
#[tokio::test]
async fn test_rejected_entry_leaves_ledger_clean() {
    let config = test_config();
    let (market_feed, forecast_feed) = sim_feeds(&config, 200);

    let mut exec = MockOrderExec::new();
    exec.expect_place_entry().returning(|_| {
        Ok(EntryFill {
            accepted: false,
            filled_size_usd: 0.0,
            fill_price: 0.0,
            rejection_reason: Some("no liquidity".to_string()),
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        })
    });
    exec.expect_close_position().never();
    exec.expect_is_healthy().returning(|| true);

    let mut repo = MockRepo::new();
    repo.expect_load_latest_snapshot().returning(|| Ok(None));
    repo.expect_save_decision().never();
    repo.expect_save_snapshot().returning(|_| Ok(()));
    repo.expect_is_healthy().returning(|| true);

    let (shutdown_tx, _) = broadcast::channel(1);
    let (stats_tx, stats_rx) = watch::channel(EngineStats::default());

    let feed_task = tokio::spawn({
        let feed = Arc::clone(&market_feed);
        let rx = shutdown_tx.subscribe();
        async move { feed.run(rx).await }
    });
    let forecast_task = tokio::spawn({
        let feed = Arc::clone(&forecast_feed);
        let rx = shutdown_tx.subscribe();
        async move { feed.run(rx).await }
    });

    let mut orchestrator = StrategyOrchestrator::new(
        market_feed,
        forecast_feed,
        Arc::new(exec),
        Arc::new(repo),
        config,
        stats_tx,
    );
    let engine_shutdown = shutdown_tx.subscribe();
    let engine_task = tokio::spawn(async move { orchestrator.run(engine_shutdown).await });

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    shutdown_tx.send(()).unwrap();

    engine_task.await.unwrap().unwrap();
    let _ = feed_task.await;
    let _ = forecast_task.await;

    let stats = stats_rx.borrow().clone();
    assert!(stats.entries_rejected > 0, "expected exchange rejections");
    assert_eq!(stats.entries_executed, 0);
    assert_eq!(stats.open_positions, 0);
    assert_eq!(stats.exposure, 0.0);
    assert_eq!(stats.capital, 1_000.0);
}

/// A rejected partial close must not consume the partial: the engine
/// keeps offering it on later cycles, and the ledger and position stay
/// exactly as they were.
#[tokio::test]
async fn test_rejected_partial_close_is_reoffered() {
    let config = test_config();
    let (market_feed, forecast_feed) = sim_feeds(&config, 200);

    let mut exec = MockOrderExec::new();
    exec.expect_place_entry().times(1..).returning(|signal| {
        Ok(EntryFill {
            accepted: true,
            filled_size_usd: signal.size_usd,
            fill_price: 0.55,
            rejection_reason: None,
            timestamp_ms: Utc::now().timestamp_millis() as u64,
        })
    });
    // The exchange keeps rejecting partial closes; the engine must retry
    // the same partial on later cycles instead of moving to the shifted
    // full thresholds.
    exec.expect_close_position()
        .withf(|_, _, _, reason| {
            matches!(
                reason,
                ExitReason::PartialTakeProfit | ExitReason::PartialStopLoss
            )
        })
        .times(2..)
        .returning(|_, _, _, _| {
            Ok(CloseFill {
                accepted: false,
                closed_size_usd: 0.0,
                close_price: 0.0,
                realized_pnl: 0.0,
                rejection_reason: Some("no liquidity".to_string()),
                timestamp_ms: Utc::now().timestamp_millis() as u64,
            })
        });
    // Shutdown close of the still-open position.
    exec.expect_close_position()
        .withf(|_, _, _, reason| *reason == ExitReason::TimeLimit)
        .returning(|_, _, size, _| {
            Ok(CloseFill {
                accepted: true,
                closed_size_usd: size,
                close_price: 0.60,
                realized_pnl: size * 0.05,
                rejection_reason: None,
                timestamp_ms: Utc::now().timestamp_millis() as u64,
            })
        });
    exec.expect_is_healthy().returning(|| true);

    let mut repo = MockRepo::new();
    repo.expect_load_latest_snapshot().returning(|| Ok(None));
    repo.expect_save_decision().returning(|_| Ok(()));
    repo.expect_save_snapshot().returning(|_| Ok(()));
    repo.expect_is_healthy().returning(|| true);

    let (shutdown_tx, _) = broadcast::channel(1);
    let (stats_tx, stats_rx) = watch::channel(EngineStats::default());

    let feed_task = tokio::spawn({
        let feed = Arc::clone(&market_feed);
        let rx = shutdown_tx.subscribe();
        async move { feed.run(rx).await }
    });
    let forecast_task = tokio::spawn({
        let feed = Arc::clone(&forecast_feed);
        let rx = shutdown_tx.subscribe();
        async move { feed.run(rx).await }
    });

    let mut orchestrator = StrategyOrchestrator::new(
        market_feed,
        forecast_feed,
        Arc::new(exec),
        Arc::new(repo),
        config,
        stats_tx,
    );
    let engine_shutdown = shutdown_tx.subscribe();
    let engine_task = tokio::spawn(async move { orchestrator.run(engine_shutdown).await });

    tokio::time::sleep(Duration::from_millis(4_000)).await;
    shutdown_tx.send(()).unwrap();

    engine_task.await.unwrap().unwrap();
    let _ = feed_task.await;
    let _ = forecast_task.await;

    // Last published cycle stats: the position never shrank and nothing
    // was booked against the ledger.
    let stats = stats_rx.borrow().clone();
    assert!(stats.entries_executed > 0, "no entries executed");
    assert_eq!(stats.exits_executed, 0, "rejected closes must not settle");
    assert_eq!(stats.open_positions, 1);
    assert!(stats.exposure > 0.0, "position exposure should remain booked");
}

/// The paper stack end to end: sim feeds, paper executor, real files.
#[tokio::test]
async fn test_paper_stack_runs_end_to_end() {
    use weather_arb_bot::adapters::persistence::FileRepository;
    use weather_arb_bot::adapters::sim::executor::PaperExecutor;

    let mut config = test_config();
    let dir = tempdir();
    config.persistence.data_dir = dir.clone();

    let (market_feed, forecast_feed) = sim_feeds(&config, 200);
    let markets = parsed_markets(&config);
    let executor = Arc::new(PaperExecutor::new(Arc::clone(&market_feed), &markets));
    let repository = Arc::new(FileRepository::from_data_dir(&dir).await.unwrap());

    let (shutdown_tx, _) = broadcast::channel(1);
    let (stats_tx, stats_rx) = watch::channel(EngineStats::default());

    let feed_task = tokio::spawn({
        let feed = Arc::clone(&market_feed);
        let rx = shutdown_tx.subscribe();
        async move { feed.run(rx).await }
    });
    let forecast_task = tokio::spawn({
        let feed = Arc::clone(&forecast_feed);
        let rx = shutdown_tx.subscribe();
        async move { feed.run(rx).await }
    });

    let mut orchestrator = StrategyOrchestrator::new(
        market_feed,
        forecast_feed,
        executor,
        Arc::clone(&repository),
        config,
        stats_tx,
    );
    let engine_shutdown = shutdown_tx.subscribe();
    let engine_task = tokio::spawn(async move { orchestrator.run(engine_shutdown).await });

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    shutdown_tx.send(()).unwrap();

    engine_task.await.unwrap().unwrap();
    let _ = feed_task.await;
    let _ = forecast_task.await;

    let stats = stats_rx.borrow().clone();
    assert!(stats.entries_executed > 0, "paper stack opened no positions");

    // Decisions were persisted and load back in timestamp order.
    use weather_arb_bot::ports::repository::Repository;
    let decisions = repository.load_decisions().await.unwrap();
    assert!(!decisions.is_empty());
    assert!(decisions.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));

    let _ = std::fs::remove_dir_all(&dir);
}

fn tempdir() -> String {
    format!(
        "target/it-{}",
        uuid::Uuid::new_v4().simple()
    )
}
