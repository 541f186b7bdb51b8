//! Evaluation records and outcomes.
//!
//! An [`EvaluationRecord`] is the raw result of running one instance in the
//! sandbox, before any policy is applied. An [`Outcome`] is the verdict for one
//! (instance, mode) pair. Both are immutable once built.

use serde::{Deserialize, Serialize};

use super::script::{reproduce_exit_marker, Stage};

/// Exit code recorded when the pipeline never ran (no patch, infrastructure failure).
pub const NOT_EXECUTED_EXIT_CODE: i64 = -1;

/// Exit codes that mean the proof-of-concept was killed by `timeout` (124) or SIGKILL (137).
pub const TIMEOUT_EXIT_CODES: [i64; 2] = [124, 137];

/// Infrastructure failure that prevented the script from running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraFailure {
    /// The patch could not be written to a temporary location.
    PatchStaging,
    /// The image was missing locally and the pull failed.
    ImageUnavailable,
    /// Container creation failed.
    SandboxCreateFailed,
    /// Start, wait or log collection failed after the container was created.
    SandboxRunFailed,
}

impl InfraFailure {
    /// Stable snake_case name, used as a metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            InfraFailure::PatchStaging => "patch_staging",
            InfraFailure::ImageUnavailable => "image_unavailable",
            InfraFailure::SandboxCreateFailed => "sandbox_create_failed",
            InfraFailure::SandboxRunFailed => "sandbox_run_failed",
        }
    }
}

impl std::fmt::Display for InfraFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw evaluation result for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationRecord {
    instance_id: String,
    patch_text: String,
    exit_code: i64,
    raw_logs: String,
    stage3_reached: bool,
    is_timeout: bool,
    expected_exit_code: Option<i64>,
    infra_failure: Option<InfraFailure>,
}

impl EvaluationRecord {
    /// Record for an instance without a patch. Nothing was executed.
    pub fn no_patch(instance_id: impl Into<String>, expected_exit_code: Option<i64>) -> Self {
        Self {
            instance_id: instance_id.into(),
            patch_text: String::new(),
            exit_code: NOT_EXECUTED_EXIT_CODE,
            raw_logs: String::new(),
            stage3_reached: false,
            is_timeout: false,
            expected_exit_code,
            infra_failure: None,
        }
    }

    /// Record for an instance whose sandbox could not be run.
    ///
    /// `message` becomes the record's logs.
    pub fn infra_failure(
        instance_id: impl Into<String>,
        patch_text: impl Into<String>,
        failure: InfraFailure,
        message: impl Into<String>,
        expected_exit_code: Option<i64>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            patch_text: patch_text.into(),
            exit_code: NOT_EXECUTED_EXIT_CODE,
            raw_logs: message.into(),
            stage3_reached: false,
            is_timeout: false,
            expected_exit_code,
            infra_failure: Some(failure),
        }
    }

    /// Record for a completed sandbox run.
    ///
    /// `stage3_reached` and `is_timeout` are derived from the logs and exit code.
    pub fn from_run(
        instance_id: impl Into<String>,
        patch_text: impl Into<String>,
        exit_code: i64,
        raw_logs: impl Into<String>,
        expected_exit_code: Option<i64>,
    ) -> Self {
        let raw_logs = raw_logs.into();
        let stage3_reached = raw_logs.contains(&Stage::Reproduce.entry_banner());
        let is_timeout = TIMEOUT_EXIT_CODES.contains(&exit_code)
            || TIMEOUT_EXIT_CODES
                .iter()
                .any(|code| raw_logs.contains(&reproduce_exit_marker(*code)));

        Self {
            instance_id: instance_id.into(),
            patch_text: patch_text.into(),
            exit_code,
            raw_logs,
            stage3_reached,
            is_timeout,
            expected_exit_code,
            infra_failure: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn patch_text(&self) -> &str {
        &self.patch_text
    }

    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn raw_logs(&self) -> &str {
        &self.raw_logs
    }

    /// True iff the reproduce stage's entry banner appears in the logs.
    pub fn stage3_reached(&self) -> bool {
        self.stage3_reached
    }

    pub fn is_timeout(&self) -> bool {
        self.is_timeout
    }

    pub fn expected_exit_code(&self) -> Option<i64> {
        self.expected_exit_code
    }

    pub fn infra_failure_kind(&self) -> Option<InfraFailure> {
        self.infra_failure
    }

    /// False when no patch was supplied for this instance.
    pub fn has_patch(&self) -> bool {
        !self.patch_text.is_empty()
    }
}

/// Classification of an outcome, kept alongside the human-readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// The patch passed under the evaluated mode.
    Success,
    /// No patch was submitted.
    NoPatchSubmitted,
    /// The sandbox never ran the script.
    Infrastructure(InfraFailure),
    /// The proof-of-concept timed out.
    Timeout,
    /// A stage printed a failure banner.
    StageFailure { stage: Stage },
    /// Non-zero exit with no recognizable stage failure banner.
    UnclassifiedFailure,
}

/// Verdict for one instance under one mode.
///
/// Serializes to the persisted report line:
/// `instance_id, success, reason, git_patch, exit_code, logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub instance_id: String,
    pub success: bool,
    pub reason: String,
    pub git_patch: String,
    pub exit_code: i64,
    pub logs: String,
    #[serde(skip)]
    pub kind: OutcomeKind,
}

impl Outcome {
    /// Builds an outcome, copying the audit fields from `record`.
    pub fn from_record(
        record: &EvaluationRecord,
        success: bool,
        kind: OutcomeKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: record.instance_id.clone(),
            success,
            reason: reason.into(),
            git_patch: record.patch_text.clone(),
            exit_code: record.exit_code,
            logs: record.raw_logs.clone(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_patch_record() {
        let record = EvaluationRecord::no_patch("a", Some(1));
        assert_eq!(record.exit_code(), NOT_EXECUTED_EXIT_CODE);
        assert!(!record.has_patch());
        assert!(!record.stage3_reached());
        assert!(!record.is_timeout());
        assert!(record.raw_logs().is_empty());
        assert_eq!(record.expected_exit_code(), Some(1));
    }

    #[test]
    fn test_from_run_detects_stage3() {
        let logs = "Step 1: Git apply\nSUCCESS: Git apply passed; exit code=0\n\
                    Step 2: Compile\nSUCCESS: Compile passed; exit code=0\n\
                    Step 3: Run PoC\nRun PoC exit code: 0\n";
        let record = EvaluationRecord::from_run("a", "diff", 0, logs, None);
        assert!(record.stage3_reached());
        assert!(!record.is_timeout());
    }

    #[test]
    fn test_from_run_build_failure_has_no_stage3() {
        let logs = "Step 1: Git apply\nSUCCESS: Git apply passed; exit code=0\n\
                    Step 2: Compile\nFAIL_STEP: Compile; exit code=2\n";
        let record = EvaluationRecord::from_run("a", "diff", 2, logs, None);
        assert!(!record.stage3_reached());
        assert!(!record.is_timeout());
    }

    #[test]
    fn test_from_run_timeout_by_exit_code() {
        for code in TIMEOUT_EXIT_CODES {
            let record = EvaluationRecord::from_run("a", "diff", code, "Step 3: Run PoC\n", None);
            assert!(record.is_timeout(), "exit code {code} should be a timeout");
        }
    }

    #[test]
    fn test_from_run_timeout_by_log_marker() {
        // Stage 3 was killed but the script's final exit status was lost.
        let logs = "Step 3: Run PoC\nRun PoC exit code: 137\n";
        let record = EvaluationRecord::from_run("a", "diff", 1, logs, None);
        assert!(record.is_timeout());
    }

    #[test]
    fn test_infra_failure_record() {
        let record = EvaluationRecord::infra_failure(
            "a",
            "diff",
            InfraFailure::ImageUnavailable,
            "Failed to pull image x: not found",
            None,
        );
        assert_eq!(record.exit_code(), NOT_EXECUTED_EXIT_CODE);
        assert_eq!(record.infra_failure_kind(), Some(InfraFailure::ImageUnavailable));
        assert_eq!(record.raw_logs(), "Failed to pull image x: not found");
    }

    #[test]
    fn test_record_serializes_derived_flags() {
        let logs = "Step 2: Compile\nFAIL_STEP: Compile; exit code=137\n";
        let record = EvaluationRecord::from_run("a", "diff", 137, logs, None);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["stage3_reached"], false);
        assert_eq!(value["is_timeout"], true);
        assert_eq!(value["exit_code"], 137);
    }

    #[test]
    fn test_outcome_serialization_fields() {
        let record = EvaluationRecord::from_run("inst-1", "diff", 0, "Step 3: Run PoC\n", None);
        let outcome = Outcome::from_record(&record, true, OutcomeKind::Success, "ok");
        let value = serde_json::to_value(&outcome).unwrap();
        let obj = value.as_object().unwrap();

        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["exit_code", "git_patch", "instance_id", "logs", "reason", "success"]
        );
        assert_eq!(obj["instance_id"], "inst-1");
        assert_eq!(obj["success"], true);
    }
}
