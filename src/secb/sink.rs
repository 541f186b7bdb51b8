//! Result accumulation and JSONL persistence.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classify::{EvalMode, ModeSelection};
use super::record::{Outcome, OutcomeKind};
use crate::error::EvalError;

/// Append-only collection of outcomes, grouped by mode.
#[derive(Debug, Default)]
pub struct ResultSink {
    outcomes: BTreeMap<EvalMode, Vec<Outcome>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an outcome under `mode`. Insertion order is preserved.
    pub fn append(&mut self, mode: EvalMode, outcome: Outcome) {
        self.outcomes.entry(mode).or_default().push(outcome);
    }

    /// Outcomes recorded for `mode`, in insertion order.
    pub fn outcomes(&self, mode: EvalMode) -> &[Outcome] {
        self.outcomes.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modes that have at least one outcome.
    pub fn modes(&self) -> impl Iterator<Item = EvalMode> + '_ {
        self.outcomes.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.values().all(Vec::is_empty)
    }

    /// Aggregates the outcomes of one mode.
    pub fn summary(&self, mode: EvalMode) -> ModeSummary {
        ModeSummary::from_outcomes(mode, self.outcomes(mode))
    }

    /// Writes one JSONL report per selected mode into `dir`.
    ///
    /// All modes produce `report_<mode>.jsonl` each; a single mode produces
    /// `report.jsonl`. Returns the written paths.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::ReportWrite` if a file cannot be created or written.
    pub fn write_reports(
        &self,
        dir: &Path,
        selection: ModeSelection,
    ) -> Result<Vec<PathBuf>, EvalError> {
        fs::create_dir_all(dir).map_err(|source| EvalError::ReportWrite {
            path: dir.display().to_string(),
            source,
        })?;

        let mut written = Vec::new();
        for mode in selection.modes() {
            let path = dir.join(report_file_name(selection, mode));
            self.write_jsonl(&path, mode)?;
            written.push(path);
        }
        Ok(written)
    }

    fn write_jsonl(&self, path: &Path, mode: EvalMode) -> Result<(), EvalError> {
        let write_err = |source| EvalError::ReportWrite {
            path: path.display().to_string(),
            source,
        };

        let file = File::create(path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);

        for outcome in self.outcomes(mode) {
            let line = serde_json::to_string(outcome)?;
            writeln!(writer, "{line}").map_err(write_err)?;
        }

        writer.flush().map_err(write_err)?;
        Ok(())
    }
}

/// File name of the report for `mode` under `selection`.
pub fn report_file_name(selection: ModeSelection, mode: EvalMode) -> String {
    match selection {
        ModeSelection::All => format!("report_{mode}.jsonl"),
        ModeSelection::Single(_) => "report.jsonl".to_string(),
    }
}

/// Aggregate counts for one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeSummary {
    pub mode: EvalMode,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub no_patch: usize,
    pub timeouts: usize,
    pub infra_failures: usize,
    pub success_rate: f64,
}

impl ModeSummary {
    pub fn from_outcomes(mode: EvalMode, outcomes: &[Outcome]) -> Self {
        let total = outcomes.len();
        let count = |pred: fn(&Outcome) -> bool| outcomes.iter().filter(|o| pred(o)).count();

        let succeeded = count(|o| o.success);
        let no_patch = count(|o| o.kind == OutcomeKind::NoPatchSubmitted);
        let timeouts = count(|o| o.kind == OutcomeKind::Timeout);
        let infra_failures = count(|o| matches!(o.kind, OutcomeKind::Infrastructure(_)));

        let success_rate = if total > 0 {
            succeeded as f64 / total as f64
        } else {
            0.0
        };

        Self {
            mode,
            total,
            succeeded,
            failed: total - succeeded,
            no_patch,
            timeouts,
            infra_failures,
            success_rate,
        }
    }
}

/// Summary of a whole evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub instances: usize,
    pub modes: Vec<ModeSummary>,
    /// Report files written for this run, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<PathBuf>,
}

impl EvaluationSummary {
    pub fn mode(&self, mode: EvalMode) -> Option<&ModeSummary> {
        self.modes.iter().find(|m| m.mode == mode)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
