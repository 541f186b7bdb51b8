//! Prometheus metrics registration and export.
//!
//! This module defines the Prometheus metrics used by secb-eval and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all secb-eval metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Outcomes produced, labeled by mode and result (`success` / `failure`).
pub static OUTCOMES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Infrastructure failures, labeled by kind.
pub static INFRA_FAILURES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Wall-clock time from container start to log collection, in seconds.
pub static SANDBOX_RUN_SECONDS: OnceLock<Histogram> = OnceLock::new();

/// Number of instances currently being evaluated.
pub static INSTANCES_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Until this runs, recording is a no-op.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let outcomes_total = CounterVec::new(
        Opts::new("secb_outcomes_total", "Total outcomes produced per mode"),
        &["mode", "result"],
    )?;

    let infra_failures_total = CounterVec::new(
        Opts::new(
            "secb_infra_failures_total",
            "Instances that could not be run in the sandbox",
        ),
        &["kind"],
    )?;

    // Builds dominate; the PoC itself is capped by the stage 3 timeout.
    let sandbox_run_seconds = Histogram::with_opts(
        HistogramOpts::new(
            "secb_sandbox_run_seconds",
            "Sandbox run duration in seconds",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
    )?;

    let instances_in_progress = Gauge::new(
        "secb_instances_in_progress",
        "Number of instances currently being evaluated",
    )?;

    registry.register(Box::new(outcomes_total.clone()))?;
    registry.register(Box::new(infra_failures_total.clone()))?;
    registry.register(Box::new(sandbox_run_seconds.clone()))?;
    registry.register(Box::new(instances_in_progress.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = OUTCOMES_TOTAL.set(outcomes_total);
    let _ = INFRA_FAILURES_TOTAL.set(infra_failures_total);
    let _ = SANDBOX_RUN_SECONDS.set(sandbox_run_seconds);
    let _ = INSTANCES_IN_PROGRESS.set(instances_in_progress);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, the returned
/// string is a single comment line describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
