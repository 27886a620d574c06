//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (file I/O, HTTP servers, simulations). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `sim`: deterministic paper-trading feeds and executor
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL decision logging and state snapshots

pub mod metrics;
pub mod persistence;
pub mod sim;
