//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `cloud_resource_reconciliations_total` - Reconciliations per resource type
//! - `cloud_resource_reconciliation_errors_total` - Failed reconciliations per resource type
//! - `cloud_resource_reconciliation_duration_seconds` - Duration of reconciliations
//! - `cloud_resource_provider_operations_total` - Provider create/delete calls by result
//! - `cloud_resource_provider_operation_duration_seconds` - Duration of provider calls
//! - `cloud_resource_status_phase_transitions_total` - Status phase changes written

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cloud_resource_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["resource_type"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cloud_resource_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["resource_type", "reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cloud_resource_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["resource_type"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static PROVIDER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cloud_resource_provider_operations_total",
            "Total number of provider operations",
        ),
        &["provider", "operation", "result"],
    )
    .expect("Failed to create PROVIDER_OPERATIONS_TOTAL metric - this should never happen")
});

static PROVIDER_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cloud_resource_provider_operation_duration_seconds",
            "Duration of provider operations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["provider", "operation"],
    )
    .expect("Failed to create PROVIDER_OPERATION_DURATION metric - this should never happen")
});

static STATUS_PHASE_TRANSITIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cloud_resource_status_phase_transitions_total",
            "Total number of status phase transitions",
        ),
        &["resource_type", "phase"],
    )
    .expect("Failed to create STATUS_PHASE_TRANSITIONS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STATUS_PHASE_TRANSITIONS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(resource_type: &str) {
    RECONCILIATIONS_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

pub fn increment_reconciliation_errors(resource_type: &str, reason: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

pub fn observe_reconciliation_duration(resource_type: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[resource_type])
        .observe(duration);
}

/// Record one provider call
pub fn record_provider_operation(provider: &str, operation: &str, duration: f64, success: bool) {
    let result = if success { "success" } else { "error" };
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[provider, operation, result])
        .inc();
    PROVIDER_OPERATION_DURATION
        .with_label_values(&[provider, operation])
        .observe(duration);
}

pub fn increment_phase_transitions(resource_type: &str, phase: &str) {
    STATUS_PHASE_TRANSITIONS_TOTAL
        .with_label_values(&[resource_type, phase])
        .inc();
}
