//! Prometheus Metrics Registry - Engine Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers decision cycles, detected signals, entries, exits by reason,
//! admission rejections by reason, and the capital/heat gauges. The
//! registry is fed from `EngineStats` snapshots published by the
//! orchestrator; the engine itself never touches Prometheus types.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, warn};

use crate::usecases::orchestrator::EngineStats;

/// Centralized Prometheus metrics for the decision engine.
///
/// All metrics follow the naming convention `weather_arb_*`.
pub struct EngineMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Decision cycle counters by outcome.
    pub cycles: IntCounterVec,
    /// Detected signal counter.
    pub signals: prometheus::IntCounter,
    /// Executed entries counter.
    pub entries: prometheus::IntCounter,
    /// Exits by reason.
    pub exits: IntCounterVec,
    /// Admission rejections by violated constraint.
    pub rejections: IntCounterVec,
    /// Current capital gauge (USDC).
    pub capital: Gauge,
    /// Open exposure gauge (USDC).
    pub exposure: Gauge,
    /// Portfolio heat gauge (summed Kelly fractions).
    pub heat: Gauge,
    /// Drawdown vs peak capital gauge.
    pub drawdown: Gauge,
    /// Open position count gauge.
    pub open_positions: IntGauge,
    /// Circuit breaker status gauge (1 = active).
    pub circuit_breaker_active: IntGauge,
}

impl EngineMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles = IntCounterVec::new(
            Opts::new("weather_arb_cycles_total", "Decision cycles by outcome"),
            &["outcome"],
        )?;
        let signals = prometheus::IntCounter::new(
            "weather_arb_signals_total",
            "Signals detected above the edge threshold",
        )?;
        let entries = prometheus::IntCounter::new(
            "weather_arb_entries_total",
            "Entries executed",
        )?;
        let exits = IntCounterVec::new(
            Opts::new("weather_arb_exits_total", "Exits executed, by reason"),
            &["reason"],
        )?;
        let rejections = IntCounterVec::new(
            Opts::new(
                "weather_arb_rejections_total",
                "Admissions rejected, by violated constraint",
            ),
            &["constraint"],
        )?;
        let capital = Gauge::new("weather_arb_capital_usdc", "Current capital in USDC")?;
        let exposure = Gauge::new("weather_arb_exposure_usdc", "Open exposure in USDC")?;
        let heat = Gauge::new(
            "weather_arb_portfolio_heat",
            "Summed Kelly fractions of open positions",
        )?;
        let drawdown = Gauge::new("weather_arb_drawdown", "Drawdown vs peak capital")?;
        let open_positions =
            IntGauge::new("weather_arb_open_positions", "Open position count")?;
        let circuit_breaker_active = IntGauge::new(
            "weather_arb_circuit_breaker_active",
            "Whether the kill switch is active (1=yes, 0=no)",
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(signals.clone()))?;
        registry.register(Box::new(entries.clone()))?;
        registry.register(Box::new(exits.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(capital.clone()))?;
        registry.register(Box::new(exposure.clone()))?;
        registry.register(Box::new(heat.clone()))?;
        registry.register(Box::new(drawdown.clone()))?;
        registry.register(Box::new(open_positions.clone()))?;
        registry.register(Box::new(circuit_breaker_active.clone()))?;

        Ok(Self {
            registry,
            cycles,
            signals,
            entries,
            exits,
            rejections,
            capital,
            exposure,
            heat,
            drawdown,
            open_positions,
            circuit_breaker_active,
        })
    }

    /// Reconcile the registry with an engine stats snapshot.
    ///
    /// Counters are monotonic on both sides, so the delta since the
    /// last observation is what gets incremented.
    pub fn observe(&self, stats: &EngineStats) {
        let completed = self.cycles.with_label_values(&["completed"]);
        if stats.cycles_completed > completed.get() {
            completed.inc_by(stats.cycles_completed - completed.get());
        }
        let skipped = self.cycles.with_label_values(&["skipped"]);
        if stats.cycles_skipped > skipped.get() {
            skipped.inc_by(stats.cycles_skipped - skipped.get());
        }
        let errored = self.cycles.with_label_values(&["error"]);
        if stats.cycle_errors > errored.get() {
            errored.inc_by(stats.cycle_errors - errored.get());
        }
        let preempted = self.cycles.with_label_values(&["preempted"]);
        if stats.preempted_cycles > preempted.get() {
            preempted.inc_by(stats.preempted_cycles - preempted.get());
        }

        if stats.signals_detected > self.signals.get() {
            self.signals.inc_by(stats.signals_detected - self.signals.get());
        }
        if stats.entries_executed > self.entries.get() {
            self.entries.inc_by(stats.entries_executed - self.entries.get());
        }
        for (reason, count) in &stats.exits_by_reason {
            let counter = self.exits.with_label_values(&[reason]);
            if *count > counter.get() {
                counter.inc_by(count - counter.get());
            }
        }
        for (constraint, count) in &stats.rejections_by_reason {
            let counter = self.rejections.with_label_values(&[constraint]);
            if *count > counter.get() {
                counter.inc_by(count - counter.get());
            }
        }

        self.capital.set(stats.capital);
        self.exposure.set(stats.exposure);
        self.heat.set(stats.heat);
        self.drawdown.set(stats.drawdown);
        self.open_positions.set(stats.open_positions as i64);
        self.circuit_breaker_active
            .set(i64::from(stats.kill_switch_active));
    }

    /// Consume engine stats snapshots until shutdown.
    pub async fn watch_stats(
        self: Arc<Self>,
        mut stats_rx: watch::Receiver<EngineStats>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                changed = stats_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let stats = stats_rx.borrow_and_update().clone();
                    self.observe(&stats);
                }
            }
        }
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let registry = metrics_self.registry.clone();
                async move {
                    let encoder = TextEncoder::new();
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                        warn!(error = %e, "Failed to encode metrics");
                    }
                    String::from_utf8(buffer).unwrap_or_default()
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_is_idempotent_per_snapshot() {
        let metrics = EngineMetrics::new().unwrap();
        let mut stats = EngineStats::default();
        stats.cycles_completed = 5;
        stats.signals_detected = 3;
        stats.capital = 1000.0;

        metrics.observe(&stats);
        metrics.observe(&stats);
        assert_eq!(metrics.cycles.with_label_values(&["completed"]).get(), 5);
        assert_eq!(metrics.signals.get(), 3);
        assert_eq!(metrics.capital.get(), 1000.0);
    }

    #[test]
    fn test_exits_by_reason_labels() {
        let metrics = EngineMetrics::new().unwrap();
        let mut stats = EngineStats::default();
        stats.exits_by_reason.insert("stop_loss", 2);
        stats.exits_by_reason.insert("take_profit", 1);

        metrics.observe(&stats);
        assert_eq!(metrics.exits.with_label_values(&["stop_loss"]).get(), 2);
        assert_eq!(metrics.exits.with_label_values(&["take_profit"]).get(), 1);
    }
}
