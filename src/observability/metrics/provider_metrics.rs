//! # Provider Metrics
//!
//! Metrics for calls made against PlanetScale and ProviderConfig usage.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};
use std::sync::LazyLock;

static EXTERNAL_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "provider_planetscale_external_operations_total",
            "Total number of external operations (observe, create, update, delete)",
        ),
        &["kind", "operation", "result"],
    )
    .expect("Failed to create EXTERNAL_OPERATIONS_TOTAL metric - this should never happen")
});

static EXTERNAL_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "provider_planetscale_external_operation_duration_seconds",
            "Duration of external operations in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["kind", "operation"],
    )
    .expect("Failed to create EXTERNAL_OPERATION_DURATION metric - this should never happen")
});

static PROVIDER_CONFIG_USERS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "provider_planetscale_provider_config_users",
            "Number of managed resources using each ProviderConfig",
        ),
        &["provider_config"],
    )
    .expect("Failed to create PROVIDER_CONFIG_USERS metric - this should never happen")
});

/// Register provider metrics with the registry
pub(crate) fn register_provider_metrics() -> Result<()> {
    REGISTRY.register(Box::new(EXTERNAL_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXTERNAL_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_CONFIG_USERS.clone()))?;
    Ok(())
}

pub fn record_external_operation(kind: &str, operation: &str, success: bool, duration: f64) {
    let result = if success { "success" } else { "error" };
    EXTERNAL_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation, result])
        .inc();
    EXTERNAL_OPERATION_DURATION
        .with_label_values(&[kind, operation])
        .observe(duration);
}

pub fn set_provider_config_users(provider_config: &str, users: i64) {
    PROVIDER_CONFIG_USERS
        .with_label_values(&[provider_config])
        .set(users);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_external_operation() {
        let labels = ["Database", "create", "error"];
        let before = EXTERNAL_OPERATIONS_TOTAL.with_label_values(&labels).get();
        record_external_operation("Database", "create", false, 0.2);
        let after = EXTERNAL_OPERATIONS_TOTAL.with_label_values(&labels).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_set_provider_config_users() {
        set_provider_config_users("team-a", 3);
        assert_eq!(
            PROVIDER_CONFIG_USERS.with_label_values(&["team-a"]).get(),
            3
        );
    }
}
