//! # Reconciler Configuration
//!
//! Timing, concurrency and rate-limit settings for the managed reconcilers.

use super::env_var_or_default;
use crate::constants::*;
use std::time::Duration;

/// Managed resource controller configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Steady-state requeue interval after a successful pass
    /// External drift is detected at most this long after it happens
    pub poll_interval: Duration,
    /// Deadline applied to every reconciliation attempt
    pub reconcile_timeout: Duration,
    /// Maximum concurrent reconciliations per resource kind
    pub max_concurrent_reconciles: u16,
    /// First backoff delay after a failure
    pub backoff_base: Duration,
    /// Cap on the per-resource backoff delay
    pub backoff_max: Duration,
    /// Global reconcile rate shared by every kind (passes per second)
    pub global_rate_per_sec: u32,
    /// Global reconcile burst shared by every kind
    pub global_rate_burst: u32,
    /// PlanetScale API base URL
    pub planetscale_api_url: String,
    /// HTTP timeout for PlanetScale API requests
    pub http_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            global_rate_per_sec: DEFAULT_GLOBAL_RATE_PER_SEC,
            global_rate_burst: DEFAULT_GLOBAL_RATE_BURST,
            planetscale_api_url: DEFAULT_PLANETSCALE_API_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(env_var_or_default(
                "POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            reconcile_timeout: Duration::from_secs(env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            )),
            max_concurrent_reconciles: env_var_or_default(
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            ),
            backoff_base: Duration::from_millis(env_var_or_default(
                "BACKOFF_BASE_MS",
                DEFAULT_BACKOFF_BASE_MS,
            )),
            backoff_max: Duration::from_secs(env_var_or_default(
                "BACKOFF_MAX_SECS",
                DEFAULT_BACKOFF_MAX_SECS,
            )),
            global_rate_per_sec: env_var_or_default(
                "GLOBAL_RATE_PER_SEC",
                DEFAULT_GLOBAL_RATE_PER_SEC,
            ),
            global_rate_burst: env_var_or_default("GLOBAL_RATE_BURST", DEFAULT_GLOBAL_RATE_BURST),
            planetscale_api_url: std::env::var("PLANETSCALE_API_URL")
                .unwrap_or_else(|_| DEFAULT_PLANETSCALE_API_URL.to_string()),
            http_timeout: Duration::from_secs(env_var_or_default(
                "PLANETSCALE_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
        }
    }
}
