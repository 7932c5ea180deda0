//! Bounded-concurrency draining of a job queue.
//!
//! Every job is pushed onto an unbounded channel in submission order and the
//! sender is dropped before any worker starts. Workers pull with a blocking
//! `recv`; once the queue is empty the closed channel makes `recv` fail for
//! every worker, which is the normal shutdown signal. A fatal error
//! (configuration or precondition) raises an abort flag that workers check
//! before every dequeue, so the rest of the queue is left undrained. Dequeue
//! order is FIFO across the pool, completion order is not constrained.

use crate::core::job::JobDescriptor;
use crate::engine::dispatcher::{Dispatcher, JobRun};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crossbeam_channel::{Receiver, unbounded};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum JobOutcome {
    /// The program ran and its result was parsed.
    Succeeded { workdir: PathBuf },
    /// The program ran but left no usable result.
    Degraded { workdir: PathBuf },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job: String,
    pub backend: String,
    /// Position of the job in the submitted batch.
    pub index: usize,
    pub outcome: JobOutcome,
}

/// Per-job outcomes of one pool run, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub reports: Vec<JobReport>,
    /// Largest number of jobs observed running at the same time.
    pub peak_concurrency: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Succeeded { .. }))
    }

    pub fn degraded(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Degraded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Failed { .. }))
    }

    pub fn all_ran(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Appends `other` after the jobs already recorded, renumbering its indices.
    pub fn extend(&mut self, other: BatchSummary) {
        let offset = self.reports.len();
        self.reports
            .extend(other.reports.into_iter().map(|mut r| {
                r.index += offset;
                r
            }));
        self.peak_concurrency = self.peak_concurrency.max(other.peak_concurrency);
    }
}

impl JobReport {
    fn from_run(index: usize, backend: &str, run: Result<JobRun, (String, EngineError)>) -> Self {
        match run {
            Ok(run) => Self {
                outcome: if run.result.is_some() {
                    JobOutcome::Succeeded {
                        workdir: run.workdir,
                    }
                } else {
                    JobOutcome::Degraded {
                        workdir: run.workdir,
                    }
                },
                job: run.job,
                backend: run.backend,
                index,
            },
            Err((job, e)) => Self {
                job,
                backend: backend.to_string(),
                index,
                outcome: JobOutcome::Failed {
                    message: e.to_string(),
                },
            },
        }
    }
}

pub struct WorkerPool<'d> {
    dispatcher: &'d Dispatcher,
}

impl<'d> WorkerPool<'d> {
    pub fn new(dispatcher: &'d Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Runs every job exactly once on at most `worker_count` workers.
    ///
    /// `threads_per_job`, when given, overrides each job's thread count.
    /// Every job is validated before anything is queued, so an unknown or
    /// unimplemented backend fails the whole batch without launching a job.
    /// After that, a job failing at run time is logged and recorded while its
    /// siblings keep running, unless the error is fatal: then no further job
    /// is dequeued and the error is returned once in-flight jobs finish.
    #[instrument(skip_all, name = "worker_pool", fields(jobs = jobs.len(), workers = worker_count))]
    pub fn run_all(
        &self,
        jobs: Vec<JobDescriptor>,
        worker_count: usize,
        threads_per_job: Option<usize>,
        reporter: &ProgressReporter,
    ) -> Result<BatchSummary, EngineError> {
        for job in &jobs {
            self.dispatcher.validate(job)?;
        }
        if jobs.is_empty() {
            return Ok(BatchSummary::default());
        }

        let total = jobs.len();
        let workers = worker_count.clamp(1, total);
        info!(total, workers, "Draining job queue.");

        let (tx, rx) = unbounded();
        for (index, mut job) in jobs.into_iter().enumerate() {
            if let Some(threads) = threads_per_job {
                job.options.threads = threads.max(1);
            }
            // The receiver is alive in this scope, so sending cannot fail.
            let _ = tx.send((index, job));
        }
        drop(tx);

        let state = PoolState {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            reports: Mutex::new(Vec::with_capacity(total)),
            abort: AtomicBool::new(false),
            fatal: Mutex::new(None),
        };

        reporter.report(Progress::TaskStart {
            total: total as u64,
        });
        std::thread::scope(|s| {
            for worker in 0..workers {
                let rx = rx.clone();
                let state = &state;
                s.spawn(move || self.worker_loop(worker, rx, state, reporter));
            }
        });
        reporter.report(Progress::TaskFinish);

        let fatal = state
            .fatal
            .into_inner()
            .map_err(|_| EngineError::Internal("a worker panicked while recording an error".into()))?;
        if let Some(e) = fatal {
            error!(error = %e, "Batch aborted.");
            return Err(e);
        }

        let mut reports = state
            .reports
            .into_inner()
            .map_err(|_| EngineError::Internal("a worker panicked while recording a report".into()))?;
        reports.sort_by_key(|r| r.index);
        if reports.len() != total {
            return Err(EngineError::Internal(format!(
                "{} of {} jobs were not accounted for",
                total - reports.len(),
                total
            )));
        }

        let summary = BatchSummary {
            reports,
            peak_concurrency: state.peak.into_inner(),
        };
        info!(
            succeeded = summary.succeeded(),
            degraded = summary.degraded(),
            failed = summary.failed(),
            peak = summary.peak_concurrency,
            "Job queue drained."
        );
        Ok(summary)
    }

    #[instrument(skip_all, name = "worker", fields(worker = id))]
    fn worker_loop(
        &self,
        id: usize,
        rx: Receiver<(usize, JobDescriptor)>,
        state: &PoolState,
        reporter: &ProgressReporter,
    ) {
        loop {
            if state.abort.load(Ordering::SeqCst) {
                debug!(worker = id, "Abort flag raised; worker stopping.");
                break;
            }
            let Ok((index, job)) = rx.recv() else {
                break;
            };
            let name = job.name();
            let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            state.peak.fetch_max(now, Ordering::SeqCst);
            reporter.report(Progress::JobStarted {
                job: name.clone(),
                worker: id,
            });

            let run = self.dispatcher.run_job(&job);
            state.in_flight.fetch_sub(1, Ordering::SeqCst);

            match &run {
                Ok(r) if r.result.is_none() => {
                    warn!(job = %name, backend = %job.backend, "Job ran without a usable result.")
                }
                Ok(_) => info!(job = %name, backend = %job.backend, "Job finished."),
                Err(e) => error!(job = %name, backend = %job.backend, error = %e, "Job failed."),
            }
            reporter.report(Progress::JobFinished {
                job: name.clone(),
                succeeded: run.is_ok(),
            });
            reporter.report(Progress::TaskIncrement { amount: 1 });

            let run = match run {
                Err(e) if e.is_fatal() => {
                    state.abort.store(true, Ordering::SeqCst);
                    if let Ok(mut fatal) = state.fatal.lock() {
                        fatal.get_or_insert(e);
                    }
                    continue;
                }
                Ok(r) if r.result.is_none() => {
                    self.dispatcher
                        .notify(reporter, format!("{}: finished without a usable result", name));
                    Ok(r)
                }
                other => other,
            };

            let report = JobReport::from_run(index, &job.backend, run.map_err(|e| (name, e)));
            if let Ok(mut reports) = state.reports.lock() {
                reports.push(report);
            }
        }
    }
}

struct PoolState {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    reports: Mutex<Vec<JobReport>>,
    abort: AtomicBool,
    /// First fatal error seen by any worker.
    fatal: Mutex<Option<EngineError>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::JobOptions;
    use crate::engine::backends::BackendRegistry;
    use crate::engine::backends::testing::ScriptedLauncher;
    use crate::engine::config::RunnerConfigBuilder;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn dispatcher(launcher: Arc<ScriptedLauncher>) -> Dispatcher {
        let config = RunnerConfigBuilder::new()
            .default_backend("cpmd")
            .mpi_prefix(vec!["mpirun".into(), "-np".into()])
            .executable("cpmd", "/opt/cpmd.x")
            .build()
            .unwrap();
        Dispatcher::with_parts(Arc::new(config), BackendRegistry::default(), launcher)
    }

    fn batch(dir: &Path, n: usize) -> Vec<JobDescriptor> {
        (0..n)
            .map(|i| {
                let input = dir.join(format!("job{:02}.inp", i));
                fs::write(&input, "&CPMD\n&END\n").unwrap();
                JobDescriptor::new(input, "cpmd", JobOptions::with_threads(1))
            })
            .collect()
    }

    #[test]
    fn every_job_runs_exactly_once_for_any_worker_count() {
        for n in [1, 2, 5, 9] {
            for w in 1..=n {
                let dir = tempdir().unwrap();
                let launcher = Arc::new(ScriptedLauncher::new(vec![]));
                let dispatcher = dispatcher(Arc::clone(&launcher));

                let summary = WorkerPool::new(&dispatcher)
                    .run_all(batch(dir.path(), n), w, None, &ProgressReporter::new())
                    .unwrap();

                assert_eq!(summary.total(), n);
                assert_eq!(summary.succeeded(), n);
                assert!(summary.peak_concurrency <= w);

                let mut counts: HashMap<String, usize> = HashMap::new();
                for job in launcher.launched_jobs() {
                    *counts.entry(job).or_default() += 1;
                }
                assert_eq!(counts.len(), n, "n={} w={}", n, w);
                assert!(counts.values().all(|&c| c == 1), "n={} w={}", n, w);
            }
        }
    }

    #[test]
    fn five_jobs_on_two_workers_never_exceed_two_in_flight() {
        let dir = tempdir().unwrap();
        let launcher = Arc::new(ScriptedLauncher::new(vec![]).delay(Duration::from_millis(30)));
        let dispatcher = dispatcher(Arc::clone(&launcher));

        let summary = WorkerPool::new(&dispatcher)
            .run_all(batch(dir.path(), 5), 2, Some(4), &ProgressReporter::new())
            .unwrap();

        assert_eq!(summary.succeeded(), 5);
        assert!((1..=2).contains(&launcher.peak.load(Ordering::SeqCst)));
        assert!(summary.peak_concurrency <= 2);
        assert!(
            launcher
                .calls
                .lock()
                .unwrap()
                .iter()
                .all(|r| r.ranks == Some(4))
        );
        let indices: Vec<usize> = summary.reports.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn failing_job_does_not_stop_siblings() {
        let dir = tempdir().unwrap();
        let launcher = Arc::new(ScriptedLauncher::new(vec![]).failing("job01"));
        let dispatcher = dispatcher(Arc::clone(&launcher));

        let summary = WorkerPool::new(&dispatcher)
            .run_all(batch(dir.path(), 4), 2, None, &ProgressReporter::new())
            .unwrap();

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.succeeded(), 3);
        assert!(matches!(
            &summary.reports[1].outcome,
            JobOutcome::Failed { message } if message.contains("job01")
        ));
        assert_eq!(launcher.call_count(), 4);
    }

    #[test]
    fn fatal_error_stops_the_drain_and_fails_the_batch() {
        let dir = tempdir().unwrap();
        let launcher = Arc::new(ScriptedLauncher::new(vec![]));
        let dispatcher = dispatcher(Arc::clone(&launcher));
        let mut jobs = batch(dir.path(), 4);
        jobs[1].options.checkpoint_files = vec![dir.path().join("ref/RESTART")];

        let err = WorkerPool::new(&dispatcher)
            .run_all(jobs, 1, None, &ProgressReporter::new())
            .unwrap_err();

        assert!(matches!(err, EngineError::Precondition { ref job, .. } if job == "job01"));
        assert_eq!(launcher.launched_jobs(), vec!["job00".to_string()]);
        assert!(!dir.path().join("job02").exists());
        assert!(!dir.path().join("job03").exists());
    }

    #[test]
    fn cleanup_of_input_directories_fails_the_batch_before_any_launch() {
        let dir = tempdir().unwrap();
        let launcher = Arc::new(ScriptedLauncher::new(vec![]));
        let dispatcher = dispatcher(Arc::clone(&launcher));
        let mut jobs = batch(dir.path(), 3);
        jobs[2].options.in_place = true;
        jobs[2].options.cleanup = true;

        let err = WorkerPool::new(&dispatcher)
            .run_all(jobs, 2, None, &ProgressReporter::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(launcher.call_count(), 0);
    }

    #[test]
    fn unimplemented_backend_fails_the_batch_before_any_launch() {
        let dir = tempdir().unwrap();
        let launcher = Arc::new(ScriptedLauncher::new(vec![]));
        let dispatcher = dispatcher(Arc::clone(&launcher));
        let mut jobs = batch(dir.path(), 3);
        jobs[2].backend = "gamess".into();

        let err = WorkerPool::new(&dispatcher)
            .run_all(jobs, 2, None, &ProgressReporter::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::BackendNotImplemented { .. }));
        assert_eq!(launcher.call_count(), 0);
    }

    #[test]
    fn empty_batch_returns_empty_summary() {
        let launcher = Arc::new(ScriptedLauncher::new(vec![]));
        let dispatcher = dispatcher(launcher);
        let summary = WorkerPool::new(&dispatcher)
            .run_all(Vec::new(), 4, None, &ProgressReporter::new())
            .unwrap();
        assert_eq!(summary, BatchSummary::default());
    }

    #[test]
    fn progress_events_cover_every_job() {
        let dir = tempdir().unwrap();
        let dispatcher = dispatcher(Arc::new(ScriptedLauncher::new(vec![])));
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|p| events.lock().unwrap().push(p)));

        WorkerPool::new(&dispatcher)
            .run_all(batch(dir.path(), 3), 2, None, &reporter)
            .unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        assert_eq!(events.first(), Some(&Progress::TaskStart { total: 3 }));
        assert_eq!(events.last(), Some(&Progress::TaskFinish));
        let finished = events
            .iter()
            .filter(|e| matches!(e, Progress::JobFinished { succeeded: true, .. }))
            .count();
        assert_eq!(finished, 3);
    }
}
