//! Weather Arbitrage Bot — Entry Point
//!
//! Initializes configuration, logging, the simulated feeds, and the
//! strategy orchestrator. Runs until SIGINT/SIGTERM.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create shutdown broadcast channel + health state
//! 4. Create sim world, market feed, forecast feed (deterministic)
//! 5. Create paper executor (OrderExecution port)
//! 6. Create file repository (JSONL decisions + atomic snapshots)
//! 7. Spawn health server, metrics server, metrics stats watcher
//! 8. Spawn feed tasks and the strategy orchestrator
//! 9. Wait for SIGINT → graceful shutdown (close-all→snapshot→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

mod adapters;
mod config;
mod domain;
mod ports;
mod usecases;

use adapters::metrics::{EngineMetrics, HealthServer, HealthState};
use adapters::persistence::FileRepository;
use adapters::sim::executor::PaperExecutor;
use adapters::sim::feed::{ForecastScript, SimForecastFeed, SimMarketFeed};
use adapters::sim::SimWorld;
use usecases::orchestrator::{EngineStats, StrategyOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.bot.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.bot.name,
        version = env!("CARGO_PKG_VERSION"),
        dry_run = config.bot.dry_run,
        markets = config.markets.len(),
        "Starting weather arbitrage bot"
    );
    if config.bot.dry_run {
        warn!("Dry-run mode — paper fills only, no real orders");
    }

    // ── 3. Shutdown channel + health state ──────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let health = Arc::new(HealthState::new());

    // ── 4. Simulated feeds (deterministic scenario) ─────────
    let markets: Vec<_> = config
        .markets
        .iter()
        .filter(|m| m.active)
        .map(|m| m.to_parsed())
        .collect();
    let scripts: Vec<ForecastScript> = markets
        .iter()
        .map(|m| ForecastScript {
            market_id: m.market_id.clone(),
            start_value: m.threshold - 2.0,
            end_value: m.threshold + 3.0,
            steps: 120,
        })
        .collect();

    let world = Arc::new(SimWorld::new());
    let market_feed = Arc::new(SimMarketFeed::new(
        markets.clone(),
        Arc::clone(&world),
        1_000,
    ));
    let forecast_feed = Arc::new(SimForecastFeed::new(
        markets.clone(),
        scripts,
        Arc::clone(&world),
        5_000,
    ));

    // ── 5. Paper executor (OrderExecution port) ─────────────
    let executor = Arc::new(PaperExecutor::new(Arc::clone(&market_feed), &markets));

    // ── 6. File repository (Repository port) ────────────────
    let repository = Arc::new(
        FileRepository::from_data_dir(&config.persistence.data_dir)
            .await
            .context("Failed to initialize persistence")?,
    );

    // ── 7. Health + metrics servers ─────────────────────────
    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_handle = tokio::spawn(health_server.run(shutdown_tx.subscribe()));

    let (stats_tx, stats_rx) = watch::channel(EngineStats::default());
    let mut metrics_handle = None;
    if config.metrics.enabled {
        let metrics = Arc::new(EngineMetrics::new().context("Failed to build metrics")?);
        metrics_handle = Some(tokio::spawn(Arc::clone(&metrics).serve(
            config.metrics.bind_address.clone(),
            shutdown_tx.subscribe(),
        )));
        tokio::spawn(metrics.watch_stats(stats_rx, shutdown_tx.subscribe()));
    }

    // ── 8. Feed tasks + orchestrator ────────────────────────
    let feed_ref = Arc::clone(&market_feed);
    let feed_shutdown = shutdown_tx.subscribe();
    let feed_handle = tokio::spawn(async move {
        if let Err(e) = feed_ref.run(feed_shutdown).await {
            error!(error = %e, "Sim market feed task failed");
        }
    });

    let forecast_ref = Arc::clone(&forecast_feed);
    let forecast_shutdown = shutdown_tx.subscribe();
    let forecast_handle = tokio::spawn(async move {
        if let Err(e) = forecast_ref.run(forecast_shutdown).await {
            error!(error = %e, "Sim forecast feed task failed");
        }
    });

    let mut orchestrator = StrategyOrchestrator::new(
        market_feed,
        forecast_feed,
        executor,
        repository,
        config.clone(),
        stats_tx,
    );
    let engine_shutdown = shutdown_tx.subscribe();
    let engine_handle = tokio::spawn(async move {
        if let Err(e) = orchestrator.run(engine_shutdown).await {
            error!(error = %e, "Strategy orchestrator failed");
        }
    });

    info!("All tasks spawned — engine is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    // Graceful shutdown: stop accepting, signal tasks, wait.
    health.stop_accepting();
    let _ = shutdown_tx.send(());

    // The orchestrator closes open positions and snapshots on its way out.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(30), engine_handle).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), feed_handle).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), forecast_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
    }
    health_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
