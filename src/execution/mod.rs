//! Docker execution layer for secb-eval.
//!
//! This module provides the sandbox runtime used to apply, build and
//! reproduce each instance. The [`SandboxRuntime`] trait describes the
//! container operations the evaluator needs; [`DockerClient`] implements it
//! on top of the bollard crate.
//!
//! # Lifecycle
//!
//! ```text
//! CREATE (pull + retry once on missing image) → START → WAIT → LOGS → REMOVE
//! ```
//!
//! # Example
//!
//! ```ignore
//! use secb_eval::execution::{ContainerConfig, CreateAttempt, DockerClient, SandboxRuntime};
//!
//! let client = DockerClient::new()?;
//! let config = ContainerConfig::new("secb-eval-demo", "ubuntu:22.04")
//!     .with_cmd(vec!["echo".into(), "hello".into()]);
//!
//! if let CreateAttempt::Resolved(id) = client.create_container(&config).await {
//!     client.start_container(&id).await?;
//!     let code = client.wait_container(&id).await?;
//!     let logs = client.get_logs(&id).await?;
//!     client.remove_container(&id, true).await?;
//! }
//! ```

pub mod docker_client;
pub mod runtime;

pub use docker_client::{ContainerConfig, DockerClient};
pub use runtime::{CreateAttempt, SandboxRuntime};
