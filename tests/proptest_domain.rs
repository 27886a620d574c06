//! Property-Based Tests — Domain and Risk Invariants
//!
//! Uses `proptest` to verify that the pricing, sizing, and risk
//! components maintain their invariants across random inputs.

use proptest::prelude::*;

use weather_arb_bot::config::RiskConfig;
use weather_arb_bot::domain::costs::{CostModel, SafetyMarginTiers};
use weather_arb_bot::domain::edge::{EdgeCalculator, EdgeRequest};
use weather_arb_bot::domain::kelly::KellySizer;
use weather_arb_bot::usecases::market_store::MarketStateStore;
use weather_arb_bot::usecases::risk_gate::PortfolioRiskGate;

fn calculator(min_edge: f64) -> EdgeCalculator {
    EdgeCalculator::new(
        min_edge,
        0.02,
        KellySizer::new(0.25),
        CostModel::new(0.01, 0.005, 0.02, SafetyMarginTiers::default()),
    )
}

fn risk_config(capital: f64) -> RiskConfig {
    RiskConfig {
        starting_capital: capital,
        max_position_fraction: 0.15,
        max_portfolio_exposure: 0.50,
        min_cash_reserve: 0.10,
        max_kelly_heat: 0.30,
        max_correlated_exposure: 0.20,
        circuit_breaker_losses: 5,
        max_drawdown_fraction: 0.15,
        cooldown_seconds: 1800,
    }
}

// ── Kelly Sizer Properties ──────────────────────────────────

proptest! {
    /// The fractional Kelly sizing must stay within [0, fraction].
    #[test]
    fn kelly_fraction_bounded(
        p in 0.01f64..0.99,
        price in 0.01f64..0.99,
    ) {
        let sizer = KellySizer::new(0.25);
        let f = sizer.sizing_fraction(p, price);
        prop_assert!(f >= 0.0, "negative sizing fraction {f}");
        prop_assert!(f <= 0.25 + 1e-12, "fraction {f} above safety cap");
    }

    /// More probability at the same price never sizes smaller.
    #[test]
    fn kelly_monotone_in_probability(
        p in 0.10f64..0.80,
        delta in 0.01f64..0.15,
        price in 0.05f64..0.95,
    ) {
        let sizer = KellySizer::new(0.25);
        let lo = sizer.sizing_fraction(p, price);
        let hi = sizer.sizing_fraction(p + delta, price);
        prop_assert!(hi >= lo, "p={p} f={lo} but p={} f={hi}", p + delta);
    }
}

// ── Edge Calculator Properties ──────────────────────────────

proptest! {
    /// Any emitted non-guaranteed edge clears the effective threshold.
    #[test]
    fn emitted_edge_clears_threshold(
        p in 0.05f64..0.95,
        price_yes in 0.05f64..0.95,
        size in 10.0f64..2000.0,
        min_edge in 0.01f64..0.20,
    ) {
        let calc = calculator(min_edge);
        let req = EdgeRequest {
            market_id: "m".to_string(),
            forecast_probability: p,
            price_yes,
            price_no: 1.0 - price_yes,
            sigma: Some(1.5),
            trade_size_usd: size,
            skip_costs: false,
            confidence: 0.8,
        };
        if let Some(edge) = calc.calculate(&req) {
            if !edge.is_guaranteed {
                prop_assert!(
                    edge.adjusted_edge >= calc.effective_min_edge() - 1e-12,
                    "adjusted {} below threshold {}",
                    edge.adjusted_edge,
                    calc.effective_min_edge()
                );
            }
            prop_assert!(edge.kelly_fraction >= 0.0);
            prop_assert!(edge.kelly_fraction <= 0.25 + 1e-12);
        }
    }

    /// Cost adjustment never increases the edge.
    #[test]
    fn costs_never_increase_edge(
        p in 0.05f64..0.95,
        price_yes in 0.05f64..0.95,
        size in 10.0f64..2000.0,
    ) {
        let calc = calculator(0.01);
        let req = EdgeRequest {
            market_id: "m".to_string(),
            forecast_probability: p,
            price_yes,
            price_no: 1.0 - price_yes,
            sigma: None,
            trade_size_usd: size,
            skip_costs: false,
            confidence: 0.8,
        };
        if let Some(edge) = calc.calculate(&req) {
            prop_assert!(edge.adjusted_edge <= edge.raw_edge + 1e-12);
        }
    }
}

// ── Cost Model Properties ───────────────────────────────────

proptest! {
    /// Slippage is monotone in trade size and the breakdown sums.
    #[test]
    fn cost_breakdown_consistent(
        size in 0.0f64..10_000.0,
        extra in 1.0f64..5_000.0,
        sigma in proptest::option::of(0.0f64..5.0),
    ) {
        let model = CostModel::new(0.01, 0.005, 0.02, SafetyMarginTiers::default());
        let b = model.breakdown(size, sigma);
        prop_assert!((b.total() - (b.slippage + b.spread + b.safety_margin)).abs() < 1e-12);
        prop_assert!(model.slippage(size + extra) >= model.slippage(size));
    }
}

// ── Market Store Properties ─────────────────────────────────

proptest! {
    /// After any tick sequence, retained points stay inside the window
    /// and the velocity statistic is finite.
    #[test]
    fn store_pruning_respects_window(
        deltas in prop::collection::vec(1u64..30_000, 1..60),
        prices in prop::collection::vec(0.05f64..0.95, 60),
    ) {
        let mut store = MarketStateStore::new(60_000, 30_000, 86_400_000, 1.0);
        store.register_market(test_market());

        let mut ts = 1_000_000u64;
        let mut latest = ts;
        for (delta, price) in deltas.iter().zip(prices.iter()) {
            ts += delta;
            if store.update_price(&"m-yes".to_string(), *price, ts) {
                latest = ts;
            }
        }

        let state = store.market(&"m".to_string()).unwrap();
        let min_ts = latest.saturating_sub(60_000);
        for point in state.yes.points() {
            prop_assert!(point.timestamp_ms >= min_ts, "stale point survived pruning");
            prop_assert!(point.timestamp_ms <= latest);
        }
        prop_assert!(state.yes.velocity_per_sec().is_finite());
    }
}

// ── Risk Gate Properties ────────────────────────────────────

proptest! {
    /// No admissible sequence of opens can breach the portfolio caps.
    #[test]
    fn admitted_positions_respect_caps(
        requests in prop::collection::vec(
            (10.0f64..400.0, 0.01f64..0.20, 0u8..4),
            1..25,
        ),
    ) {
        let mut gate = PortfolioRiskGate::new(&risk_config(1_000.0));
        let now_ms = 1_000_000;

        for (i, (size, kelly, event)) in requests.iter().enumerate() {
            let market_id = format!("m{i}");
            let event_key = format!("city{event}");
            if gate.can_admit(&market_id, *size, *kelly, &event_key, now_ms).is_ok() {
                gate.record_open(&market_id, *size, *kelly, &event_key);
            }

            let capital = gate.capital();
            prop_assert!(gate.exposure() / capital <= 0.50 + 1e-9);
            prop_assert!(gate.heat() <= 0.30 + 1e-9);
            prop_assert!(
                (capital - gate.exposure()) / capital >= 0.10 - 1e-9,
                "cash reserve breached"
            );
        }
    }
}

fn test_market() -> weather_arb_bot::domain::types::ParsedWeatherMarket {
    use chrono::TimeZone;
    weather_arb_bot::domain::types::ParsedWeatherMarket {
        market_id: "m".to_string(),
        question: "test market".to_string(),
        yes_token_id: "m-yes".to_string(),
        no_token_id: "m-no".to_string(),
        threshold: 90.0,
        comparison: weather_arb_bot::domain::types::ComparisonType::Above,
        event_key: "nyc".to_string(),
        target_date: chrono::Utc.with_ymd_and_hms(2026, 7, 4, 0, 0, 0).unwrap(),
        price_yes: 0.5,
        price_no: 0.5,
    }
}
