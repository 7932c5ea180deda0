use super::{GlobalOptions, build_dispatcher, job_options};
use crate::cli::BatchArgs;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use qcjob::engine::pool::JobOutcome;
use qcjob::engine::progress::ProgressReporter;
use qcjob::workflows::batch::{self, BatchReport, BatchSource, BatchSpec, ScanSpec};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(
    args: BatchArgs,
    globals: GlobalOptions<'_>,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let (effective, dispatcher) = build_dispatcher(&globals)?;

    if !args.dir.is_dir() {
        return Err(CliError::Argument(format!(
            "input directory '{}' does not exist",
            args.dir.display()
        )));
    }
    let workers = args.workers.unwrap_or(effective.workers);
    if workers == 0 {
        return Err(CliError::Argument("--workers must be at least 1".into()));
    }

    let scan = (args.alchemy || args.reference.is_some()).then(|| ScanSpec {
        reference: args.reference.clone(),
        reference_threads: args.reference_threads,
    });
    let spec = BatchSpec {
        backend: args.job.program.clone(),
        options: job_options(&args.job, args.threads_per_job),
        workers,
        threads_per_job: args.threads_per_job,
        scan,
        ..BatchSpec::new(BatchSource::Directory {
            dir: args.dir.clone(),
            pattern: args.pattern.clone(),
        })
    };

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Running '{}' in {} on {} worker(s)...",
        args.pattern,
        args.dir.display(),
        workers
    );
    info!("Invoking the batch workflow...");

    let report = tokio::task::block_in_place(|| batch::run(&spec, &dispatcher, &reporter))?;

    print_report(&report);
    if args.summary {
        let toml = toml::to_string_pretty(&report).map_err(|e| CliError::Other(e.into()))?;
        println!("\n{}", toml);
    }

    if report.all_ran() {
        Ok(())
    } else {
        Err(CliError::JobsFailed {
            failed: report.jobs.failed(),
            total: report.jobs.total(),
        })
    }
}

fn print_report(report: &BatchReport) {
    if let Some(reference) = &report.reference {
        println!("Reference: {} ({})", reference.job, reference.workdir.display());
    }
    let jobs = &report.jobs;
    if jobs.total() == 0 {
        warn!("Batch matched no inputs.");
        println!("Warning: no inputs matched.");
        return;
    }
    for r in &jobs.reports {
        match &r.outcome {
            JobOutcome::Succeeded { workdir } => println!("  ✓ {:<24} {}", r.job, workdir.display()),
            JobOutcome::Degraded { workdir } => {
                println!("  ⚠ {:<24} {} (no result)", r.job, workdir.display())
            }
            JobOutcome::Failed { message } => println!("  ✗ {:<24} {}", r.job, message),
        }
    }
    println!(
        "{} job(s): {} succeeded, {} without result, {} failed (peak concurrency {}).",
        jobs.total(),
        jobs.succeeded(),
        jobs.degraded(),
        jobs.failed(),
        jobs.peak_concurrency
    );
}
