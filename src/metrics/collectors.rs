//! Recording helpers for evaluation metrics.
//!
//! `MetricsCollector` wraps the raw Prometheus metrics with consistent
//! labeling. Every method is a no-op until
//! [`init_metrics`](super::init_metrics) has run, so library users and tests
//! never need to set up a registry.

use super::prometheus::{
    INFRA_FAILURES_TOTAL, INSTANCES_IN_PROGRESS, OUTCOMES_TOTAL, SANDBOX_RUN_SECONDS,
};

/// Metrics collector for recording evaluation metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one classified outcome.
    pub fn record_outcome(&self, mode: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        if let Some(outcomes) = OUTCOMES_TOTAL.get() {
            outcomes.with_label_values(&[mode, result]).inc();
        }
        tracing::trace!(mode = mode, result = result, "Recorded outcome metric");
    }

    /// Record an instance that never ran the evaluation script.
    pub fn record_infra_failure(&self, kind: &str) {
        if let Some(failures) = INFRA_FAILURES_TOTAL.get() {
            failures.with_label_values(&[kind]).inc();
        }
    }

    /// Record the duration of one sandbox run.
    pub fn observe_sandbox_run(&self, duration_secs: f64) {
        if let Some(histogram) = SANDBOX_RUN_SECONDS.get() {
            histogram.observe(duration_secs);
        }
    }

    /// Mark an instance as started. Pair with [`instance_finished`](Self::instance_finished).
    pub fn instance_started(&self) {
        if let Some(gauge) = INSTANCES_IN_PROGRESS.get() {
            gauge.inc();
        }
    }

    pub fn instance_finished(&self) {
        if let Some(gauge) = INSTANCES_IN_PROGRESS.get() {
            gauge.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_recording_without_init_does_not_panic() {
        let collector = MetricsCollector::new();
        collector.record_outcome("strict", true);
        collector.record_infra_failure("image_unavailable");
        collector.observe_sandbox_run(1.5);
        collector.instance_started();
        collector.instance_finished();
    }

    #[test]
    fn test_recorded_metrics_are_exported() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();
        collector.record_outcome("generous", false);
        collector.record_infra_failure("sandbox_create_failed");
        collector.observe_sandbox_run(42.0);

        let text = export_metrics();
        assert!(text.contains("secb_outcomes_total"));
        assert!(text.contains("mode=\"generous\""));
        assert!(text.contains("secb_infra_failures_total"));
        assert!(text.contains("secb_sandbox_run_seconds"));
    }
}
