//! Docker API wrapper using the bollard crate.
//!
//! This module provides the Docker implementation of [`SandboxRuntime`]:
//! one-shot containers that run a command to completion, are waited on,
//! have their logs collected and are then removed.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;

use crate::error::DockerError;
use crate::execution::runtime::{CreateAttempt, SandboxRuntime};

/// Configuration for creating a new container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Unique name for the container.
    pub name: String,
    /// Docker image to use.
    pub image: String,
    /// Command to run in the container.
    pub cmd: Option<Vec<String>>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Bind mounts (host:container[:mode] format).
    pub volumes: Vec<String>,
    /// Network mode (e.g., "none", "bridge", "host").
    pub network_mode: Option<String>,
}

impl ContainerConfig {
    /// Creates a new container configuration with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd: None,
            working_dir: None,
            volumes: Vec::new(),
            network_mode: None,
        }
    }

    /// Sets the command to run in the container.
    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds bind mounts.
    pub fn with_volumes(mut self, volumes: Vec<String>) -> Self {
        self.volumes = volumes;
        self
    }

    /// Sets the network mode.
    pub fn with_network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = Some(mode.into());
        self
    }
}

/// Raw container output, decoded once all frames have arrived.
///
/// Frames are split at arbitrary byte offsets, so a multibyte character may
/// straddle two of them.
#[derive(Debug, Default)]
struct LogBuffer {
    bytes: Vec<u8>,
}

impl LogBuffer {
    fn push(&mut self, frame: &[u8]) {
        self.bytes.extend_from_slice(frame);
    }

    fn finish(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

/// Docker client wrapper for container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client connecting to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if the Docker daemon is not accessible.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Reads the exit code of a stopped container from its inspect data.
    async fn inspected_exit_code(&self, id: &str) -> Result<i64, DockerError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => DockerError::ContainerNotFound { id: id.to_string() },
                other => DockerError::RunFailed(format!("Failed to inspect container: {other}")),
            })?;

        info.state
            .and_then(|state| state.exit_code)
            .ok_or_else(|| DockerError::RunFailed("Container did not exit normally".to_string()))
    }
}

#[async_trait]
impl SandboxRuntime for DockerClient {
    async fn create_container(&self, config: &ContainerConfig) -> CreateAttempt {
        let host_config = HostConfig {
            network_mode: config.network_mode.clone(),
            binds: if config.volumes.is_empty() {
                None
            } else {
                Some(config.volumes.clone())
            },
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            working_dir: config.working_dir.clone(),
            host_config: Some(host_config),
            tty: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        match self
            .docker
            .create_container(Some(options), container_config)
            .await
        {
            Ok(response) => CreateAttempt::Resolved(response.id),
            // The create endpoint only answers 404 when the image is missing locally.
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => CreateAttempt::ImageNotFound,
            Err(e) => CreateAttempt::Failed(e.to_string()),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| DockerError::PullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start container: {e}")))?;

        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, DockerError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit status as an error carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(DockerError::RunFailed(format!(
                "Error waiting for container: {e}"
            ))),
            None => self.inspected_exit_code(id).await,
        }
    }

    async fn get_logs(&self, id: &str) -> Result<String, DockerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            ..Default::default()
        };

        let mut logs = self.docker.logs(id, Some(options));
        let mut output = LogBuffer::default();

        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => {
                    output.push(&message);
                }
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    return Err(DockerError::RunFailed(format!("Error reading logs: {e}")));
                }
            }
        }

        Ok(output.finish())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to remove container: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_config_builder() {
        let config = ContainerConfig::new("secb-eval-test", "hwiwonlee/secb.eval.x86_64.foo:latest")
            .with_cmd(vec![
                "bash".to_string(),
                "-c".to_string(),
                "echo hi".to_string(),
            ])
            .with_working_dir("/src/foo")
            .with_volumes(vec!["/tmp/x:/testcase:rw".to_string()])
            .with_network_mode("none");

        assert_eq!(config.name, "secb-eval-test");
        assert_eq!(config.image, "hwiwonlee/secb.eval.x86_64.foo:latest");
        assert_eq!(config.cmd.unwrap().len(), 3);
        assert_eq!(config.working_dir.unwrap(), "/src/foo");
        assert_eq!(config.volumes, vec!["/tmp/x:/testcase:rw".to_string()]);
        assert_eq!(config.network_mode.unwrap(), "none");
    }

    #[test]
    fn test_log_buffer_joins_split_multibyte_chars() {
        let text = "héllo ✓ wörld";
        let bytes = text.as_bytes();
        // Split inside the two-byte 'é' and the three-byte '✓'.
        let mut buffer = LogBuffer::default();
        buffer.push(&bytes[..2]);
        buffer.push(&bytes[2..8]);
        buffer.push(&bytes[8..]);
        assert_eq!(buffer.finish(), text);
    }

    #[test]
    fn test_log_buffer_replaces_invalid_bytes() {
        let mut buffer = LogBuffer::default();
        buffer.push(b"ok \xff end");
        assert_eq!(buffer.finish(), "ok \u{fffd} end");
    }

    #[test]
    fn test_container_config_defaults() {
        let config = ContainerConfig::new("c", "img:tag");
        assert!(config.cmd.is_none());
        assert!(config.volumes.is_empty());
        assert!(config.network_mode.is_none());
    }
}
