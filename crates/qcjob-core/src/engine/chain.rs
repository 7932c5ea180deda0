//! Alchemical scans: one reference job gates a wave of dependent jobs.
//!
//! The reference runs synchronously on the calling thread, outside the pool,
//! with restart artifacts kept. Only after its checkpoint files are found does
//! the controller annotate the dependents and hand them to the
//! [`WorkerPool`]. A failed reference, or a checkpoint that is missing when
//! captured or gone by the time the dependents are queued, stops the scan
//! before any dependent is dispatched.
//!
//! Checkpoints are captured from the backend's checkpoint directory (the
//! scratch directory when one is set) and staged back into the same place for
//! each dependent.

use crate::core::job::{JobBatch, JobDescriptor};
use crate::engine::backends::CheckpointRule;
use crate::engine::dispatcher::{Dispatcher, JobRun};
use crate::engine::error::EngineError;
use crate::engine::pool::{BatchSummary, WorkerPool};
use crate::engine::progress::{Progress, ProgressReporter};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Idle,
    ReferenceRunning,
    ReferenceDone,
    DependentsQueued,
    Draining,
    Done,
}

/// A reference job and the dependents that will resume from its checkpoint.
#[derive(Debug, Clone)]
pub struct DependencyWave {
    pub reference: JobDescriptor,
    pub dependents: Vec<JobDescriptor>,
}

impl DependencyWave {
    /// Splits `batch` into a reference and its dependents. `reference` names
    /// the reference input by file name; without it the first job is used.
    pub fn from_batch(mut batch: JobBatch, reference: Option<&str>) -> Result<Self, EngineError> {
        let reference = match reference {
            Some(name) => batch.take_by_file_name(name).ok_or_else(|| {
                EngineError::Configuration(format!(
                    "reference job '{}' is not part of the batch",
                    name
                ))
            })?,
            None => batch.take_first().ok_or_else(|| {
                EngineError::Configuration("an alchemical scan needs at least one job".into())
            })?,
        };
        Ok(Self {
            reference,
            dependents: batch.into_jobs(),
        })
    }
}

/// Result of a completed scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub reference: JobRun,
    /// Checkpoint files staged into every dependent.
    pub checkpoint: Vec<PathBuf>,
    pub dependents: BatchSummary,
}

pub struct ChainController<'d> {
    dispatcher: &'d Dispatcher,
    state: ChainState,
}

impl<'d> ChainController<'d> {
    pub fn new(dispatcher: &'d Dispatcher) -> Self {
        Self {
            dispatcher,
            state: ChainState::Idle,
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    fn advance(&mut self, next: ChainState) {
        debug!(from = ?self.state, to = ?next, "Scan state change.");
        self.state = next;
    }

    /// Runs the reference, then the dependents on `worker_count` workers.
    ///
    /// The reference gets `reference_threads` ranks; dependents get
    /// `threads_per_job` when given, else their own thread count.
    #[instrument(skip_all, name = "alchemical_scan", fields(reference = %wave.reference.name(), dependents = wave.dependents.len()))]
    pub fn run(
        &mut self,
        wave: DependencyWave,
        worker_count: usize,
        reference_threads: usize,
        threads_per_job: Option<usize>,
        reporter: &ProgressReporter,
    ) -> Result<ScanReport, EngineError> {
        let DependencyWave {
            mut reference,
            dependents,
        } = wave;

        reference.options.save_restart = true;
        reference.options.cleanup = false;
        reference.options.threads = reference_threads.max(1);

        let driver = self.dispatcher.validate(&reference)?;
        for job in &dependents {
            self.dispatcher.validate(job)?;
        }

        reporter.report(Progress::PhaseStart {
            name: "Reference job",
        });
        self.advance(ChainState::ReferenceRunning);
        info!(job = %reference.name(), backend = %reference.backend, "Running reference job.");
        let reference_run = self.dispatcher.run_job(&reference)?;
        self.advance(ChainState::ReferenceDone);
        reporter.report(Progress::PhaseFinish);

        let rule = driver.checkpoint_rule();
        let location = driver.checkpoint_dir(&reference_run.workdir, &reference.options);
        let checkpoint = rule
            .locate(&location)
            .map_err(|e| EngineError::io(&location, e))?
            .ok_or_else(|| EngineError::Precondition {
                job: reference_run.job.clone(),
                backend: reference_run.backend.clone(),
                message: format!(
                    "reference finished but left no checkpoint ({}) in '{}'",
                    rule.describe(),
                    location.display()
                ),
            })?;
        info!(files = checkpoint.len(), dir = ?location, "Reference checkpoint captured.");
        if !checkpoint.is_empty() {
            self.dispatcher.notify(
                reporter,
                format!(
                    "Reference checkpoint: {} file(s) in {}",
                    checkpoint.len(),
                    location.display()
                ),
            );
        }

        let dependents = annotate(dependents, rule, &checkpoint);
        self.advance(ChainState::DependentsQueued);

        reporter.report(Progress::PhaseStart { name: "Dependents" });
        if let Some(gone) = checkpoint.iter().find(|path| !path.is_file()) {
            return Err(EngineError::Precondition {
                job: reference_run.job.clone(),
                backend: reference_run.backend.clone(),
                message: format!(
                    "checkpoint '{}' disappeared before it could be staged",
                    gone.display()
                ),
            });
        }
        self.advance(ChainState::Draining);
        let summary = WorkerPool::new(self.dispatcher).run_all(
            dependents,
            worker_count,
            threads_per_job,
            reporter,
        )?;
        reporter.report(Progress::PhaseFinish);
        self.advance(ChainState::Done);

        Ok(ScanReport {
            reference: reference_run,
            checkpoint,
            dependents: summary,
        })
    }
}

/// Marks every dependent as a restart run that stages `checkpoint`.
fn annotate(
    dependents: Vec<JobDescriptor>,
    rule: CheckpointRule,
    checkpoint: &[PathBuf],
) -> Vec<JobDescriptor> {
    if rule == CheckpointRule::None {
        return dependents;
    }
    dependents
        .into_iter()
        .map(|mut job| {
            job.options.restart = true;
            job.options
                .checkpoint_files
                .extend(checkpoint.iter().cloned());
            job
        })
        .collect()
}
