//! SEC-bench patch verification.
//!
//! A candidate patch for a memory-safety bug is applied, built and checked
//! against the bug's proof-of-concept inside a per-instance Docker image:
//!
//! ```text
//! PatchSet + Dataset ─► SandboxExecutor::run ─► EvaluationRecord
//!                                                   │
//!                         ReportExtractor::extract ◄┘
//!                                   │
//!                    classify(record, report, mode) ─► Outcome ─► ResultSink
//! ```
//!
//! Each outcome is judged under one of three policies:
//!
//! - `strict`: the PoC must run to a clean exit.
//! - `medium`: the dataset's known-good exit code is also accepted.
//! - `generous`: any completed PoC run without a sanitizer report passes.
//!
//! A timeout fails in every mode.

pub mod classify;
pub mod config;
pub mod dataset;
pub mod executor;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod script;
pub mod sink;

pub use classify::{classify, EvalMode, ModeSelection, NO_PATCH_REASON};
pub use config::EvalConfig;
pub use dataset::{DatasetEntry, DatasetProvider, LocalDataset, PatchEntry, PatchSet};
pub use executor::{EvalInstance, SandboxExecutor};
pub use pipeline::{BatchEvaluator, BatchRun};
pub use record::{
    EvaluationRecord, InfraFailure, Outcome, OutcomeKind, NOT_EXECUTED_EXIT_CODE,
    TIMEOUT_EXIT_CODES,
};
pub use report::{extract_sanitizer_report, ReportExtractor, ReportStrategy};
pub use script::Stage;
pub use sink::{EvaluationSummary, ModeSummary, ResultSink};
