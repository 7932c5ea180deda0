pub mod batch;
pub mod config;
pub mod run;

use crate::cli::JobFlags;
use crate::config::EffectiveConfig;
use crate::error::Result;
use qcjob::core::job::JobOptions;
use qcjob::engine::dispatcher::Dispatcher;
use std::sync::Arc;
use tracing::debug;

/// Global flags every job-running command needs.
pub struct GlobalOptions<'a> {
    pub config: Option<&'a std::path::Path>,
    pub set_values: &'a [String],
    pub quiet: bool,
}

/// Resolves the layered configuration and builds a dispatcher on top of it.
pub fn build_dispatcher(globals: &GlobalOptions) -> Result<(EffectiveConfig, Dispatcher)> {
    let effective = crate::config::resolve(globals.config, globals.set_values)?;
    debug!("Effective configuration: {:?}", effective);
    let runner_config = effective.to_runner_config(globals.quiet)?;
    Ok((effective, Dispatcher::new(Arc::new(runner_config))))
}

/// Translates the shared per-job flags into engine options.
pub fn job_options(flags: &JobFlags, threads: usize) -> JobOptions {
    JobOptions {
        save_restart: flags.save_restart,
        cleanup: flags.cleanup,
        bigmem: flags.bigmem.as_option(),
        scratch: flags.scratch.clone(),
        debug: flags.debug,
        max_steps: flags.max_steps,
        executable: flags.executable.clone(),
        output_dir: flags.output_dir.clone(),
        ..JobOptions::with_threads(threads)
    }
}
