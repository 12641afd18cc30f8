//! # Observability
//!
//! Prometheus metrics. Logging goes through `tracing` and is configured in
//! `runtime::initialization`.

pub mod metrics;
