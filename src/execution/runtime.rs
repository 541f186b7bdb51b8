//! Sandbox runtime abstraction.
//!
//! The evaluator only needs a handful of container operations. Putting them
//! behind a trait keeps the executor testable without a Docker daemon.

use async_trait::async_trait;

use crate::error::DockerError;
use crate::execution::docker_client::ContainerConfig;

/// Result of a single container-creation attempt.
///
/// Image resolution is an explicit two-step sequence: a first attempt that may
/// report [`CreateAttempt::ImageNotFound`], an image pull, then one more attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateAttempt {
    /// Container created; carries the container ID.
    Resolved(String),
    /// The image is not available locally.
    ImageNotFound,
    /// Creation failed for any other reason.
    Failed(String),
}

/// Container operations used by the sandbox executor.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Attempts to create (but not start) a container.
    async fn create_container(&self, config: &ContainerConfig) -> CreateAttempt;

    /// Pulls an image from its registry.
    async fn pull_image(&self, image: &str) -> Result<(), DockerError>;

    /// Starts a created container.
    async fn start_container(&self, id: &str) -> Result<(), DockerError>;

    /// Blocks until the container stops and returns its exit status.
    async fn wait_container(&self, id: &str) -> Result<i64, DockerError>;

    /// Returns combined stdout and stderr of the container.
    async fn get_logs(&self, id: &str) -> Result<String, DockerError>;

    /// Removes a container, killing it first when `force` is set.
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError>;
}
