//! Metrics module for Prometheus-based monitoring.
//!
//! Counts outcomes per mode and infrastructure failures per kind, and
//! records how long sandbox runs take.
//!
//! # Example
//!
//! ```ignore
//! use secb_eval::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_outcome("strict", true);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    INFRA_FAILURES_TOTAL, INSTANCES_IN_PROGRESS, OUTCOMES_TOTAL, REGISTRY, SANDBOX_RUN_SECONDS,
};
