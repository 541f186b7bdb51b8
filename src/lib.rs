//! secb-eval: patch verification for SEC-bench memory-safety instances.
//!
//! Runs each candidate patch through apply, build and proof-of-concept stages
//! inside the instance's Docker image, extracts any sanitizer report from the
//! output, and classifies the result under strict, medium and generous
//! policies.

pub mod cli;
pub mod error;
pub mod execution;
pub mod metrics;
pub mod secb;

// Re-export commonly used error types
pub use error::{ConfigError, DockerError, EvalError};
