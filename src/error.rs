//! Error types for secb-eval operations.
//!
//! Defines error types for the major subsystems:
//! - Docker container management
//! - Evaluation configuration
//! - Batch evaluation (patch input, dataset lookup, report output)
//!
//! Per-instance failures (missing patch, image pull failure, stage failure,
//! timeout) are never surfaced through these types. They are folded into an
//! [`Outcome`](crate::secb::Outcome) so the rest of the batch keeps running.

use thiserror::Error;

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Failed to pull image '{image}': {reason}")]
    PullFailed { image: String, reason: String },

    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while building or validating an [`EvalConfig`](crate::secb::EvalConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a whole evaluation run.
///
/// Anything in here means the batch itself is unusable (malformed input,
/// unknown instance, unwritable output), as opposed to a single instance
/// failing to build or reproduce.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("No valid patch entries found in {0}")]
    EmptyPatchInput(String),

    #[error("Malformed patch input '{path}': {reason}")]
    MalformedPatchInput { path: String, reason: String },

    #[error("instance_id not found in patch entry #{0}")]
    MissingInstanceId(usize),

    #[error("Malformed dataset '{path}': {reason}")]
    MalformedDataset { path: String, reason: String },

    #[error("Instance '{0}' not found in dataset")]
    UnknownInstance(String),

    #[error("Failed to write report '{path}': {source}")]
    ReportWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
