//! Batch evaluation.
//!
//! Resolves every patch entry against the dataset, runs the instances through
//! the [`SandboxExecutor`], and classifies each record under the selected
//! modes. Instance resolution happens up front so an unknown instance id
//! aborts the run before any container is started.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::info;

use super::classify::{classify, ModeSelection};
use super::dataset::{DatasetProvider, PatchSet};
use super::executor::{EvalInstance, SandboxExecutor};
use super::record::EvaluationRecord;
use super::report::ReportExtractor;
use super::sink::{EvaluationSummary, ResultSink};
use crate::error::EvalError;
use crate::execution::SandboxRuntime;
use crate::metrics::MetricsCollector;

/// Result of a batch: the per-mode outcomes and their summary.
#[derive(Debug)]
pub struct BatchRun {
    pub sink: ResultSink,
    pub summary: EvaluationSummary,
}

/// Evaluates a whole patch set.
pub struct BatchEvaluator<R: SandboxRuntime> {
    executor: SandboxExecutor<R>,
    extractor: ReportExtractor,
    selection: ModeSelection,
    parallel: usize,
    metrics: MetricsCollector,
}

impl<R: SandboxRuntime> BatchEvaluator<R> {
    pub fn new(executor: SandboxExecutor<R>, selection: ModeSelection) -> Self {
        Self {
            executor,
            extractor: ReportExtractor::default(),
            selection,
            parallel: 1,
            metrics: MetricsCollector::new(),
        }
    }

    /// Sets how many instances may run at once. Values below 1 are raised to 1.
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    pub fn with_extractor(mut self, extractor: ReportExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn executor(&self) -> &SandboxExecutor<R> {
        &self.executor
    }

    /// Resolves each patch entry to an instance, in input order.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::UnknownInstance` for the first id the dataset
    /// does not know.
    pub fn resolve<'p>(
        &self,
        patches: &'p PatchSet,
        dataset: &dyn DatasetProvider,
    ) -> Result<Vec<(EvalInstance, &'p str)>, EvalError> {
        patches
            .entries()
            .iter()
            .map(|entry| {
                dataset
                    .lookup(&entry.instance_id)
                    .map(|found| (found.to_instance(), entry.model_patch.as_str()))
                    .ok_or_else(|| EvalError::UnknownInstance(entry.instance_id.clone()))
            })
            .collect()
    }

    /// Runs every instance and classifies the results.
    ///
    /// Outcomes are appended in input order regardless of the parallel bound.
    pub async fn evaluate(
        &self,
        patches: &PatchSet,
        dataset: &dyn DatasetProvider,
    ) -> Result<BatchRun, EvalError> {
        let work = self.resolve(patches, dataset)?;
        let started_at = Utc::now();

        info!(
            "Evaluating {} instances in {:?} with parallelism={}",
            work.len(),
            self.selection.modes(),
            self.parallel
        );

        let records: Vec<EvaluationRecord> = stream::iter(work.iter())
            .map(|(instance, patch)| async move {
                self.metrics.instance_started();
                let record = self.executor.run(instance, patch).await;
                self.metrics.instance_finished();
                record
            })
            .buffered(self.parallel)
            .collect()
            .await;

        let mut sink = ResultSink::new();
        for record in &records {
            self.collect(record, &mut sink);
        }

        let summary = EvaluationSummary {
            started_at,
            finished_at: Utc::now(),
            instances: records.len(),
            modes: self
                .selection
                .modes()
                .into_iter()
                .map(|mode| sink.summary(mode))
                .collect(),
            reports: Vec::new(),
        };

        Ok(BatchRun { sink, summary })
    }

    /// Classifies one record under every selected mode.
    fn collect(&self, record: &EvaluationRecord, sink: &mut ResultSink) {
        if let Some(kind) = record.infra_failure_kind() {
            self.metrics.record_infra_failure(kind.as_str());
        }

        let report = self.extractor.extract(record.raw_logs());

        for mode in self.selection.modes() {
            let outcome = classify(record, report, mode);
            info!(
                instance_id = %outcome.instance_id,
                mode = %mode,
                success = outcome.success,
                "{}",
                outcome.reason
            );
            self.metrics.record_outcome(mode.as_str(), outcome.success);
            sink.append(mode, outcome);
        }
    }
}
