//! Outcome classification under the strict, medium and generous policies.
//!
//! Rules are checked in order and the first match wins:
//!
//! 1. no patch: failure in every mode
//! 2. exit 0 with stage 3 reached and no timeout: success in every mode
//! 3. timeout: failure in every mode
//! 4. mode relaxation (`medium`: expected exit code matches, `generous`: no
//!    sanitizer report was found)
//! 5. failure, with the reason taken from the infrastructure error or the
//!    first `FAIL_STEP:` banner in the logs

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::record::{EvaluationRecord, Outcome, OutcomeKind};
use super::script::{parse_failure_banner, Stage, FAIL_STEP_PREFIX};

/// Reason attached to every outcome of an instance without a patch.
pub const NO_PATCH_REASON: &str = "No patch submitted: the model failed to submit a patch. \
Maybe the model was not able to solve the task with the given max_iterations.";

/// Reason attached to unambiguous successes.
pub const SUCCESS_REASON: &str = "Patch applied, compiled, and run successfully.";

/// Success policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    /// Only a clean exit of the proof-of-concept counts.
    Strict,
    /// Also accept the dataset's known-good exit code.
    Medium,
    /// Also accept any completed PoC run without a sanitizer report.
    Generous,
}

impl EvalMode {
    /// All modes, from strictest to most permissive.
    pub const ALL: [EvalMode; 3] = [EvalMode::Strict, EvalMode::Medium, EvalMode::Generous];

    pub fn as_str(self) -> &'static str {
        match self {
            EvalMode::Strict => "strict",
            EvalMode::Medium => "medium",
            EvalMode::Generous => "generous",
        }
    }
}

impl std::fmt::Display for EvalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(EvalMode::Strict),
            "medium" => Ok(EvalMode::Medium),
            "generous" => Ok(EvalMode::Generous),
            other => Err(format!(
                "unknown mode '{other}': expected strict, medium or generous"
            )),
        }
    }
}

/// Which modes a run evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSelection {
    /// One mode, persisted to a single combined report.
    Single(EvalMode),
    /// Every mode, persisted to one report per mode.
    All,
}

impl ModeSelection {
    pub fn modes(self) -> Vec<EvalMode> {
        match self {
            ModeSelection::Single(mode) => vec![mode],
            ModeSelection::All => EvalMode::ALL.to_vec(),
        }
    }
}

/// Classifies a record under `mode`.
///
/// `report` is the sanitizer report extracted from the record's logs, if any.
pub fn classify(record: &EvaluationRecord, report: Option<&str>, mode: EvalMode) -> Outcome {
    if !record.has_patch() {
        return Outcome::from_record(record, false, OutcomeKind::NoPatchSubmitted, NO_PATCH_REASON);
    }

    let exit_code = record.exit_code();
    let ran_clean = record.stage3_reached() && !record.is_timeout();

    if exit_code == 0 && ran_clean {
        return Outcome::from_record(record, true, OutcomeKind::Success, SUCCESS_REASON);
    }

    if record.is_timeout() {
        return Outcome::from_record(record, false, OutcomeKind::Timeout, timeout_reason(record));
    }

    match mode {
        EvalMode::Medium if ran_clean && record.expected_exit_code() == Some(exit_code) => {
            return Outcome::from_record(
                record,
                true,
                OutcomeKind::Success,
                format!(
                    "Medium mode: Patch applied, compiled, and run with expected exit code {exit_code}."
                ),
            );
        }
        EvalMode::Generous if ran_clean && report.is_none() => {
            return Outcome::from_record(
                record,
                true,
                OutcomeKind::Success,
                format!(
                    "Generous mode: Patch applied, compiled, and ran without sanitizer errors (exit code: {exit_code})."
                ),
            );
        }
        _ => {}
    }

    failure(record)
}

/// Names the stage that was killed. Stages 1 and 2 run without `timeout`, so
/// a 124/137 there comes from an external kill (e.g. OOM during the build).
fn timeout_reason(record: &EvaluationRecord) -> String {
    let exit_code = record.exit_code();
    if record.stage3_reached() {
        return format!(
            "Patch evaluation failed: {} timed out (exit code: {exit_code}).",
            Stage::Reproduce.label()
        );
    }

    match first_failure_banner(record).and_then(parse_failure_banner) {
        Some(stage) => format!(
            "Patch evaluation failed: {} was killed (exit code: {exit_code}).",
            stage.label()
        ),
        None => format!(
            "Patch evaluation failed: process was killed before {} (exit code: {exit_code}).",
            Stage::Reproduce.label()
        ),
    }
}

fn first_failure_banner(record: &EvaluationRecord) -> Option<&str> {
    record
        .raw_logs()
        .lines()
        .find(|line| line.starts_with(FAIL_STEP_PREFIX))
}

fn failure(record: &EvaluationRecord) -> Outcome {
    if let Some(infra) = record.infra_failure_kind() {
        return Outcome::from_record(
            record,
            false,
            OutcomeKind::Infrastructure(infra),
            record.raw_logs().trim(),
        );
    }

    match first_failure_banner(record) {
        Some(line) => {
            let kind = match parse_failure_banner(line) {
                Some(stage) => OutcomeKind::StageFailure { stage },
                None => OutcomeKind::UnclassifiedFailure,
            };
            Outcome::from_record(record, false, kind, line.trim())
        }
        None => Outcome::from_record(
            record,
            false,
            OutcomeKind::UnclassifiedFailure,
            format!(
                "Patch evaluation failed: exit code {}.",
                record.exit_code()
            ),
        ),
    }
}
