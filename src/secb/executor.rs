//! Sandbox executor.
//!
//! Runs the three-stage evaluation script for one instance inside a fresh
//! container and turns whatever happened into an [`EvaluationRecord`].
//! Infrastructure problems never escape as errors; they become records with
//! the [`NOT_EXECUTED_EXIT_CODE`](super::record::NOT_EXECUTED_EXIT_CODE)
//! sentinel so a batch always produces one record per instance.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use super::config::EvalConfig;
use super::record::{EvaluationRecord, InfraFailure};
use super::script::render_script;
use crate::error::DockerError;
use crate::execution::{ContainerConfig, CreateAttempt, SandboxRuntime};
use crate::metrics::MetricsCollector;

/// One unit of work: an instance resolved against the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalInstance {
    pub instance_id: String,
    /// Working directory of the project inside the image.
    pub working_dir: String,
    /// Exit code the dataset considers acceptable, used by medium mode.
    pub expected_exit_code: Option<i64>,
}

impl EvalInstance {
    pub fn new(instance_id: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            working_dir: working_dir.into(),
            expected_exit_code: None,
        }
    }

    pub fn with_expected_exit_code(mut self, code: i64) -> Self {
        self.expected_exit_code = Some(code);
        self
    }
}

/// Drives a [`SandboxRuntime`] through the evaluation protocol.
pub struct SandboxExecutor<R: SandboxRuntime> {
    runtime: R,
    config: EvalConfig,
    script: String,
}

impl<R: SandboxRuntime> SandboxExecutor<R> {
    /// Creates an executor. The evaluation script is rendered once here.
    pub fn new(runtime: R, config: EvalConfig) -> Self {
        let script = render_script(&config);
        Self {
            runtime,
            config,
            script,
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Evaluates `patch_text` against `instance`.
    ///
    /// An empty patch short-circuits without touching the runtime. The
    /// container is force-removed on every path once it has been created, and
    /// the staged patch directory is deleted before this returns.
    pub async fn run(&self, instance: &EvalInstance, patch_text: &str) -> EvaluationRecord {
        let instance_id = instance.instance_id.as_str();
        let expected = instance.expected_exit_code;

        if patch_text.is_empty() {
            info!(instance_id = %instance_id, "No patch submitted, skipping sandbox");
            return EvaluationRecord::no_patch(instance_id, expected);
        }

        let patch = patch_text.replace("\r\n", "\n");

        let staging = match self.stage_patch(&patch) {
            Ok(dir) => dir,
            Err(e) => {
                error!(instance_id = %instance_id, error = %e, "Failed to stage patch");
                return EvaluationRecord::infra_failure(
                    instance_id,
                    patch,
                    InfraFailure::PatchStaging,
                    format!("Failed to write patch file: {e}"),
                    expected,
                );
            }
        };

        let image = self.config.image_for(instance_id);
        let container_config = self.container_config(instance, &image, staging.path());

        info!(instance_id = %instance_id, image = %image, "Creating sandbox");
        let container_id = match self.create_with_pull(&container_config).await {
            Ok(id) => id,
            Err((failure, message)) => {
                error!(instance_id = %instance_id, image = %image, kind = %failure, "{message}");
                return EvaluationRecord::infra_failure(
                    instance_id,
                    patch,
                    failure,
                    message,
                    expected,
                );
            }
        };

        let started = Instant::now();
        let result = self.execute(&container_id).await;
        MetricsCollector::new().observe_sandbox_run(started.elapsed().as_secs_f64());

        if let Err(e) = self.runtime.remove_container(&container_id, true).await {
            warn!(
                instance_id = %instance_id,
                container = %container_id,
                error = %e,
                "Failed to remove container"
            );
        }
        drop(staging);

        match result {
            Ok((exit_code, logs)) => {
                info!(instance_id = %instance_id, exit_code, "Sandbox finished");
                debug!(instance_id = %instance_id, "Container logs:\n{logs}");
                EvaluationRecord::from_run(instance_id, patch, exit_code, logs, expected)
            }
            Err(e) => {
                error!(instance_id = %instance_id, error = %e, "Sandbox run failed");
                EvaluationRecord::infra_failure(
                    instance_id,
                    patch,
                    InfraFailure::SandboxRunFailed,
                    e.to_string(),
                    expected,
                )
            }
        }
    }

    /// Writes the patch into a fresh temporary directory.
    fn stage_patch(&self, patch: &str) -> std::io::Result<TempDir> {
        let dir = tempfile::Builder::new().prefix("secb-patch-").tempdir()?;
        std::fs::write(
            dir.path().join(&self.config.patch_file_name),
            format!("{patch}\n"),
        )?;
        Ok(dir)
    }

    fn container_config(
        &self,
        instance: &EvalInstance,
        image: &str,
        patch_dir: &Path,
    ) -> ContainerConfig {
        let mut config = ContainerConfig::new(container_name(&instance.instance_id), image)
            .with_cmd(vec![
                "bash".to_string(),
                "-c".to_string(),
                self.script.clone(),
            ])
            .with_volumes(vec![format!(
                "{}:{}:rw",
                patch_dir.display(),
                self.config.patch_mount
            )]);

        if !instance.working_dir.is_empty() {
            config = config.with_working_dir(instance.working_dir.as_str());
        }
        if let Some(mode) = &self.config.network_mode {
            config = config.with_network_mode(mode.as_str());
        }
        config
    }

    /// Creates the container, pulling the image once if it is missing.
    async fn create_with_pull(
        &self,
        config: &ContainerConfig,
    ) -> Result<String, (InfraFailure, String)> {
        let image = config.image.as_str();

        match self.runtime.create_container(config).await {
            CreateAttempt::Resolved(id) => return Ok(id),
            CreateAttempt::Failed(reason) => {
                return Err((
                    InfraFailure::SandboxCreateFailed,
                    format!("Failed to create container with image {image}: {reason}"),
                ));
            }
            CreateAttempt::ImageNotFound => {}
        }

        info!(image = %image, "Image not found locally, pulling");
        if let Err(e) = self.runtime.pull_image(image).await {
            let reason = match e {
                DockerError::PullFailed { reason, .. } => reason,
                other => other.to_string(),
            };
            return Err((
                InfraFailure::ImageUnavailable,
                format!("Failed to pull image {image}: {reason}"),
            ));
        }

        match self.runtime.create_container(config).await {
            CreateAttempt::Resolved(id) => Ok(id),
            CreateAttempt::ImageNotFound => Err((
                InfraFailure::SandboxCreateFailed,
                format!("Failed to create container with image {image}: image still missing after pull"),
            )),
            CreateAttempt::Failed(reason) => Err((
                InfraFailure::SandboxCreateFailed,
                format!("Failed to create container with image {image}: {reason}"),
            )),
        }
    }

    /// Start, wait and collect logs.
    async fn execute(&self, container_id: &str) -> Result<(i64, String), DockerError> {
        self.runtime.start_container(container_id).await?;
        let exit_code = self.runtime.wait_container(container_id).await?;
        let logs = self.runtime.get_logs(container_id).await?;
        Ok((exit_code, logs))
    }
}

/// Builds a unique, Docker-safe container name for an instance.
fn container_name(instance_id: &str) -> String {
    let sanitized: String = instance_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("secb-eval-{}-{}", sanitized, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secb::record::NOT_EXECUTED_EXIT_CODE;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted runtime that records every call it receives.
    struct StubRuntime {
        calls: Mutex<Vec<String>>,
        create_results: Mutex<VecDeque<CreateAttempt>>,
        pull_error: Option<String>,
        exit_code: i64,
        logs: Result<String, String>,
        staged_patch: Mutex<Option<String>>,
        last_config: Mutex<Option<ContainerConfig>>,
    }

    impl StubRuntime {
        fn new(exit_code: i64, logs: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                create_results: Mutex::new(VecDeque::new()),
                pull_error: None,
                exit_code,
                logs: Ok(logs.to_string()),
                staged_patch: Mutex::new(None),
                last_config: Mutex::new(None),
            }
        }

        fn with_create_results(self, results: Vec<CreateAttempt>) -> Self {
            *self.create_results.lock().unwrap() = results.into();
            self
        }

        fn with_pull_error(mut self, reason: &str) -> Self {
            self.pull_error = Some(reason.to_string());
            self
        }

        fn with_log_error(mut self, reason: &str) -> Self {
            self.logs = Err(reason.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl SandboxRuntime for StubRuntime {
        async fn create_container(&self, config: &ContainerConfig) -> CreateAttempt {
            self.record("create");
            let host_dir = config.volumes[0].split(':').next().unwrap().to_string();
            let patch = std::fs::read_to_string(Path::new(&host_dir).join("model_patch.diff")).ok();
            *self.staged_patch.lock().unwrap() = patch;
            *self.last_config.lock().unwrap() = Some(config.clone());

            self.create_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| CreateAttempt::Resolved("c-1".to_string()))
        }

        async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
            self.record("pull");
            match &self.pull_error {
                Some(reason) => Err(DockerError::PullFailed {
                    image: image.to_string(),
                    reason: reason.clone(),
                }),
                None => Ok(()),
            }
        }

        async fn start_container(&self, _id: &str) -> Result<(), DockerError> {
            self.record("start");
            Ok(())
        }

        async fn wait_container(&self, _id: &str) -> Result<i64, DockerError> {
            self.record("wait");
            Ok(self.exit_code)
        }

        async fn get_logs(&self, _id: &str) -> Result<String, DockerError> {
            self.record("logs");
            self.logs.clone().map_err(DockerError::RunFailed)
        }

        async fn remove_container(&self, _id: &str, force: bool) -> Result<(), DockerError> {
            assert!(force, "containers are always force-removed");
            self.record("remove");
            Ok(())
        }
    }

    const PASSING_LOGS: &str = "Step 1: Git apply\nSUCCESS: Git apply passed; exit code=0\n\
                                Step 2: Compile\nSUCCESS: Compile passed; exit code=0\n\
                                Step 3: Run PoC\nRun PoC exit code: 0\n\
                                SUCCESS: Run PoC passed; exit code=0\n";

    fn instance() -> EvalInstance {
        EvalInstance::new("gpac.cve-2023-0001", "/src/gpac").with_expected_exit_code(1)
    }

    #[tokio::test]
    async fn test_empty_patch_makes_no_runtime_calls() {
        let executor = SandboxExecutor::new(StubRuntime::new(0, ""), EvalConfig::default());
        let record = executor.run(&instance(), "").await;

        assert!(executor.runtime().calls().is_empty());
        assert!(!record.has_patch());
        assert_eq!(record.exit_code(), NOT_EXECUTED_EXIT_CODE);
        assert_eq!(record.expected_exit_code(), Some(1));
    }

    #[tokio::test]
    async fn test_successful_run() {
        let executor = SandboxExecutor::new(StubRuntime::new(0, PASSING_LOGS), EvalConfig::default());
        let record = executor.run(&instance(), "diff --git a/x b/x").await;

        assert_eq!(
            executor.runtime().calls(),
            vec!["create", "start", "wait", "logs", "remove"]
        );
        assert_eq!(record.exit_code(), 0);
        assert!(record.stage3_reached());
        assert!(!record.is_timeout());
        assert!(record.infra_failure_kind().is_none());
        assert_eq!(record.raw_logs(), PASSING_LOGS);
    }

    #[tokio::test]
    async fn test_container_config_carries_instance_settings() {
        let config = EvalConfig::default().with_network_mode("none");
        let executor = SandboxExecutor::new(StubRuntime::new(0, PASSING_LOGS), config);
        executor.run(&instance(), "diff").await;

        let created = executor.runtime().last_config.lock().unwrap().clone().unwrap();
        assert_eq!(
            created.image,
            "hwiwonlee/secb.eval.x86_64.gpac.cve-2023-0001:latest"
        );
        assert!(created.name.starts_with("secb-eval-gpac.cve-2023-0001-"));
        assert_eq!(created.working_dir.as_deref(), Some("/src/gpac"));
        assert_eq!(created.network_mode.as_deref(), Some("none"));
        assert!(created.volumes[0].ends_with(":/testcase:rw"));

        let cmd = created.cmd.unwrap();
        assert_eq!(&cmd[..2], &["bash".to_string(), "-c".to_string()]);
        assert!(cmd[2].contains("timeout 10 secb repro"));
    }

    #[tokio::test]
    async fn test_patch_is_normalized_and_newline_terminated() {
        let executor = SandboxExecutor::new(StubRuntime::new(0, PASSING_LOGS), EvalConfig::default());
        let record = executor.run(&instance(), "line one\r\nline two").await;

        let staged = executor.runtime().staged_patch.lock().unwrap().clone();
        assert_eq!(staged.as_deref(), Some("line one\nline two\n"));
        assert_eq!(record.patch_text(), "line one\nline two");
    }

    #[tokio::test]
    async fn test_staging_dir_is_removed_after_run() {
        let executor = SandboxExecutor::new(StubRuntime::new(0, PASSING_LOGS), EvalConfig::default());
        executor.run(&instance(), "diff").await;

        let created = executor.runtime().last_config.lock().unwrap().clone().unwrap();
        let host_dir = created.volumes[0].split(':').next().unwrap().to_string();
        assert!(!Path::new(&host_dir).exists());
    }

    #[tokio::test]
    async fn test_missing_image_is_pulled_then_retried() {
        let runtime = StubRuntime::new(0, PASSING_LOGS)
            .with_create_results(vec![CreateAttempt::ImageNotFound]);
        let executor = SandboxExecutor::new(runtime, EvalConfig::default());
        let record = executor.run(&instance(), "diff").await;

        assert_eq!(
            executor.runtime().calls(),
            vec!["create", "pull", "create", "start", "wait", "logs", "remove"]
        );
        assert_eq!(record.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_pull_failure_yields_image_unavailable() {
        let runtime = StubRuntime::new(0, PASSING_LOGS)
            .with_create_results(vec![CreateAttempt::ImageNotFound])
            .with_pull_error("manifest unknown");
        let executor = SandboxExecutor::new(runtime, EvalConfig::default());
        let record = executor.run(&instance(), "diff").await;

        assert_eq!(executor.runtime().calls(), vec!["create", "pull"]);
        assert_eq!(record.infra_failure_kind(), Some(InfraFailure::ImageUnavailable));
        assert_eq!(record.exit_code(), NOT_EXECUTED_EXIT_CODE);
        assert!(record.raw_logs().starts_with("Failed to pull image"));
        assert!(record.raw_logs().contains("manifest unknown"));
    }

    #[tokio::test]
    async fn test_second_create_failure_is_reported() {
        let runtime = StubRuntime::new(0, PASSING_LOGS).with_create_results(vec![
            CreateAttempt::ImageNotFound,
            CreateAttempt::ImageNotFound,
        ]);
        let executor = SandboxExecutor::new(runtime, EvalConfig::default());
        let record = executor.run(&instance(), "diff").await;

        assert_eq!(executor.runtime().calls(), vec!["create", "pull", "create"]);
        assert_eq!(
            record.infra_failure_kind(),
            Some(InfraFailure::SandboxCreateFailed)
        );
        assert!(record.raw_logs().starts_with("Failed to create container"));
    }

    #[tokio::test]
    async fn test_create_failure_does_not_pull() {
        let runtime = StubRuntime::new(0, PASSING_LOGS)
            .with_create_results(vec![CreateAttempt::Failed("name conflict".to_string())]);
        let executor = SandboxExecutor::new(runtime, EvalConfig::default());
        let record = executor.run(&instance(), "diff").await;

        assert_eq!(executor.runtime().calls(), vec!["create"]);
        assert_eq!(
            record.infra_failure_kind(),
            Some(InfraFailure::SandboxCreateFailed)
        );
        assert!(record.raw_logs().contains("name conflict"));
    }

    #[tokio::test]
    async fn test_log_error_still_removes_container() {
        let runtime = StubRuntime::new(0, "").with_log_error("stream closed");
        let executor = SandboxExecutor::new(runtime, EvalConfig::default());
        let record = executor.run(&instance(), "diff").await;

        assert_eq!(
            executor.runtime().calls(),
            vec!["create", "start", "wait", "logs", "remove"]
        );
        assert_eq!(record.infra_failure_kind(), Some(InfraFailure::SandboxRunFailed));
        assert_eq!(record.exit_code(), NOT_EXECUTED_EXIT_CODE);
        assert!(record.raw_logs().contains("stream closed"));
    }

    #[tokio::test]
    async fn test_timeout_exit_is_flagged() {
        let logs = "Step 3: Run PoC\nRun PoC exit code: 124\nFAIL_STEP: Run PoC; exit code=124\n";
        let executor = SandboxExecutor::new(StubRuntime::new(124, logs), EvalConfig::default());
        let record = executor.run(&instance(), "diff").await;

        assert!(record.stage3_reached());
        assert!(record.is_timeout());
    }

    #[test]
    fn test_container_name_is_sanitized() {
        let name = container_name("proj/with spaces:1");
        assert!(name.starts_with("secb-eval-proj-with-spaces-1-"));
        assert_eq!(name.len(), "secb-eval-proj-with-spaces-1-".len() + 8);
    }
}
