//! Evaluation configuration.
//!
//! Everything the sandbox executor needs to know about the deployment
//! (image naming, mount layout, stage commands, PoC time budget) lives in
//! [`EvalConfig`], which is handed to the executor at construction.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default image repository prefix for SEC-bench evaluation images.
pub const DEFAULT_IMAGE_PREFIX: &str = "hwiwonlee/secb.eval.x86_64";

/// Default image tag.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Default wall-clock budget for the proof-of-concept stage, in seconds.
pub const DEFAULT_POC_TIMEOUT_SECS: u64 = 10;

/// Configuration for the sandbox executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Image repository prefix; the instance id is appended after a dot.
    pub image_prefix: String,
    /// Image tag.
    pub image_tag: String,
    /// Timeout applied to the reproduce stage only.
    pub poc_timeout_secs: u64,
    /// Container path where the patch directory is mounted.
    pub patch_mount: String,
    /// File name of the patch inside the mounted directory.
    pub patch_file_name: String,
    /// Command for stage 1 (apply the patch).
    pub apply_command: String,
    /// Command for stage 2 (build the project).
    pub build_command: String,
    /// Command for stage 3 (trigger the proof-of-concept).
    pub reproduce_command: String,
    /// Optional Docker network mode for the sandbox.
    pub network_mode: Option<String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            image_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            image_tag: DEFAULT_IMAGE_TAG.to_string(),
            poc_timeout_secs: DEFAULT_POC_TIMEOUT_SECS,
            patch_mount: "/testcase".to_string(),
            patch_file_name: "model_patch.diff".to_string(),
            apply_command: "secb patch".to_string(),
            build_command: "secb build".to_string(),
            reproduce_command: "secb repro".to_string(),
            network_mode: None,
        }
    }
}

impl EvalConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a YAML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if the
    /// resulting configuration fails [`validate`](Self::validate).
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the image prefix.
    pub fn with_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_prefix = prefix.into();
        self
    }

    /// Sets the image tag.
    pub fn with_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = tag.into();
        self
    }

    /// Sets the proof-of-concept timeout.
    pub fn with_poc_timeout_secs(mut self, secs: u64) -> Self {
        self.poc_timeout_secs = secs;
        self
    }

    /// Sets the sandbox network mode.
    pub fn with_network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = Some(mode.into());
        self
    }

    /// Returns the image reference for an instance:
    /// `{image_prefix}.{instance_id}:{image_tag}`.
    pub fn image_for(&self, instance_id: &str) -> String {
        format!("{}.{}:{}", self.image_prefix, instance_id, self.image_tag)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image_prefix.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "image_prefix cannot be empty".to_string(),
            ));
        }

        if self.image_tag.trim().is_empty() || self.image_tag.contains(':') {
            return Err(ConfigError::InvalidValue {
                key: "image_tag".to_string(),
                message: format!("'{}' is not a valid image tag", self.image_tag),
            });
        }

        if self.poc_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "poc_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !self.patch_mount.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: "patch_mount".to_string(),
                message: "must be an absolute container path".to_string(),
            });
        }

        if self.patch_file_name.is_empty() || self.patch_file_name.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "patch_file_name".to_string(),
                message: "must be a bare file name".to_string(),
            });
        }

        for (key, command) in [
            ("apply_command", &self.apply_command),
            ("build_command", &self.build_command),
            ("reproduce_command", &self.reproduce_command),
        ] {
            if command.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!("{key} cannot be empty")));
            }
        }

        Ok(())
    }
}
