//! Metrics Adapters - Prometheus Export and Health Probes
//!
//! - `prometheus`: engine metrics registry and /metrics endpoint
//! - `health`: /live and /ready probes for container orchestration

pub mod health;
pub mod prometheus;

pub use health::{HealthServer, HealthState};
pub use prometheus::EngineMetrics;
