use super::{GlobalOptions, build_dispatcher, job_options};
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use qcjob::core::job::JobDescriptor;
use tracing::info;

pub async fn run(args: RunArgs, globals: GlobalOptions<'_>) -> Result<()> {
    let (effective, dispatcher) = build_dispatcher(&globals)?;

    let mut options = job_options(&args.job, args.threads);
    options.in_place = args.inplace;
    options.restart = args.restart;
    options.remove_input = args.remove_input;
    options.dependent_files = args.dependent_files;

    let backend = args
        .job
        .program
        .unwrap_or_else(|| effective.default_program.clone());
    if !args.input.exists() {
        return Err(CliError::Argument(format!(
            "input '{}' does not exist",
            args.input.display()
        )));
    }
    let job = JobDescriptor::new(args.input, backend, options);

    println!("Running {} with {} on {} rank(s)...", job.name(), job.backend, job.options.threads);
    info!(job = %job.name(), backend = %job.backend, "Invoking a single job.");

    let run = tokio::task::block_in_place(|| dispatcher.run_job(&job))?;

    match &run.result {
        Some(result) => {
            println!("✓ {} finished in {}", run.job, run.workdir.display());
            if let Some(energy) = result.total_energy {
                println!("  Total energy: {:.8}", energy);
            }
            println!("  Output: {}", result.artifact.display());
        }
        None => {
            println!(
                "⚠ {} finished in {} but produced no parsable result",
                run.job,
                run.workdir.display()
            );
        }
    }
    Ok(())
}
