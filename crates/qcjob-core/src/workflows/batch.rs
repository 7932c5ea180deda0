use crate::core::job::{JobBatch, JobOptions};
use crate::engine::chain::{ChainController, DependencyWave};
use crate::engine::dispatcher::{Dispatcher, JobRun};
use crate::engine::error::EngineError;
use crate::engine::pool::{BatchSummary, WorkerPool};
use crate::engine::progress::{Progress, ProgressReporter};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Where the jobs of a batch come from.
#[derive(Debug, Clone)]
pub enum BatchSource {
    /// Every entry of `dir` whose name matches the wildcard `pattern`.
    Directory { dir: PathBuf, pattern: String },
    /// An explicit list of input artifacts, run in the given order.
    Inputs(Vec<PathBuf>),
}

/// Alchemical scan settings.
#[derive(Debug, Clone, Default)]
pub struct ScanSpec {
    /// File name of the reference input; the first job when `None`.
    pub reference: Option<String>,
    /// Ranks for the reference run; all workers' worth when `None`.
    pub reference_threads: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct BatchSpec {
    pub source: BatchSource,
    /// Backend for every job; the configured default when `None`.
    pub backend: Option<String>,
    /// Options applied to every job of the batch.
    pub options: JobOptions,
    pub workers: usize,
    pub threads_per_job: usize,
    pub scan: Option<ScanSpec>,
}

impl BatchSpec {
    pub fn new(source: BatchSource) -> Self {
        Self {
            source,
            backend: None,
            options: JobOptions::with_threads(1),
            workers: 1,
            threads_per_job: 1,
            scan: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// The reference run of an alchemical scan.
    pub reference: Option<JobRun>,
    pub jobs: BatchSummary,
}

impl BatchReport {
    pub fn all_ran(&self) -> bool {
        self.jobs.all_ran()
    }
}

/// Enumerates the batch described by `spec` and runs it to completion.
///
/// Without a scan every job goes straight to the worker pool. With one, the
/// reference runs first on `reference_threads` ranks (default: workers times
/// threads per job) and the remaining jobs restart from its checkpoint.
#[instrument(skip_all, name = "batch_workflow")]
pub fn run(
    spec: &BatchSpec,
    dispatcher: &Dispatcher,
    reporter: &ProgressReporter,
) -> Result<BatchReport, EngineError> {
    reporter.report(Progress::PhaseStart { name: "Enumeration" });
    let backend = spec
        .backend
        .clone()
        .unwrap_or_else(|| dispatcher.config().default_backend.clone());
    dispatcher.resolve(&backend)?;

    let batch = match &spec.source {
        BatchSource::Directory { dir, pattern } => {
            JobBatch::from_directory(dir, pattern, &backend, &spec.options)
                .map_err(|e| EngineError::io(dir, e))?
        }
        BatchSource::Inputs(inputs) => {
            JobBatch::from_inputs(inputs.iter().cloned(), &backend, &spec.options)
        }
    };
    info!(jobs = batch.len(), backend = %backend, "Batch enumerated.");
    reporter.report(Progress::PhaseFinish);

    let workers = spec.workers.max(1);
    let threads_per_job = spec.threads_per_job.max(1);

    match &spec.scan {
        None => {
            reporter.report(Progress::PhaseStart { name: "Jobs" });
            let summary = WorkerPool::new(dispatcher).run_all(
                batch.into_jobs(),
                workers,
                Some(threads_per_job),
                reporter,
            )?;
            reporter.report(Progress::PhaseFinish);
            Ok(BatchReport {
                reference: None,
                jobs: summary,
            })
        }
        Some(scan) => {
            let wave = DependencyWave::from_batch(batch, scan.reference.as_deref())?;
            let reference_threads = scan
                .reference_threads
                .unwrap_or(workers * threads_per_job);
            let report = ChainController::new(dispatcher).run(
                wave,
                workers,
                reference_threads,
                Some(threads_per_job),
                reporter,
            )?;
            Ok(BatchReport {
                reference: Some(report.reference),
                jobs: report.dependents,
            })
        }
    }
}
