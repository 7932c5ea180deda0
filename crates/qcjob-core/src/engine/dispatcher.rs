use crate::core::io::traits::{ArtifactParser, BackendResult, OutputParser};
use crate::core::job::JobDescriptor;
use crate::core::launcher::{MpiLauncher, ProcessLauncher};
use crate::engine::backends::{Backend, BackendRegistry, InputLayout, JobContext};
use crate::engine::config::RunnerConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::workdir::WorkDir;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a single dispatched job left behind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRun {
    pub job: String,
    pub backend: String,
    pub workdir: PathBuf,
    /// `None` when the program ran but left no parseable result.
    pub result: Option<BackendResult>,
}

/// Runs one job through its backend driver: working directory, staging,
/// launch, collection and cleanup.
///
/// The dispatcher holds no per-job state; one instance is shared by every
/// worker of a pool.
pub struct Dispatcher {
    config: Arc<RunnerConfig>,
    registry: BackendRegistry,
    launcher: Arc<dyn ProcessLauncher>,
    parsers: HashMap<String, Arc<dyn OutputParser>>,
    fallback_parser: ArtifactParser,
}

impl Dispatcher {
    /// Dispatcher with the default registry and an MPI launcher built from the
    /// configured prefix.
    pub fn new(config: Arc<RunnerConfig>) -> Self {
        let launcher = Arc::new(MpiLauncher::new(config.mpi_prefix.clone()));
        Self::with_parts(config, BackendRegistry::default(), launcher)
    }

    pub fn with_parts(
        config: Arc<RunnerConfig>,
        registry: BackendRegistry,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            config,
            registry,
            launcher,
            parsers: HashMap::new(),
            fallback_parser: ArtifactParser,
        }
    }

    /// Uses `parser` for every job of `backend` instead of the artifact-only fallback.
    pub fn with_parser(mut self, backend: &str, parser: Arc<dyn OutputParser>) -> Self {
        self.parsers.insert(backend.to_ascii_lowercase(), parser);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn resolve(&self, backend: &str) -> Result<Arc<dyn Backend>, EngineError> {
        self.registry.resolve(backend)
    }

    /// Resolves `job`'s backend and rejects option combinations that cannot
    /// be honoured. Cheap enough to run over a whole batch before any launch.
    pub fn validate(&self, job: &JobDescriptor) -> Result<Arc<dyn Backend>, EngineError> {
        let driver = self.resolve(&job.backend)?;
        if job.options.cleanup {
            let runs_in_input = match driver.input_layout() {
                InputLayout::Directory => true,
                InputLayout::DeckFile => job.options.in_place,
            };
            if runs_in_input {
                return Err(EngineError::Configuration(format!(
                    "job '{}' ({}): cleanup would delete the input directory '{}'",
                    job.name(),
                    job.backend,
                    WorkDir::plan(job, &job.name(), driver.input_layout()).display()
                )));
            }
        }
        Ok(driver)
    }

    /// Reports `message` to the progress sink unless the run is quiet.
    pub fn notify(&self, reporter: &ProgressReporter, message: impl Into<String>) {
        if !self.config.quiet {
            reporter.report(Progress::Message(message.into()));
        }
    }

    /// Working directory `job` will run in, without creating it.
    pub fn plan_workdir(&self, job: &JobDescriptor) -> Result<PathBuf, EngineError> {
        let driver = self.resolve(&job.backend)?;
        Ok(WorkDir::plan(job, &job.name(), driver.input_layout()))
    }

    fn parser_for(&self, backend: &str) -> &dyn OutputParser {
        match self.parsers.get(&backend.to_ascii_lowercase()) {
            Some(parser) => parser.as_ref(),
            None => &self.fallback_parser,
        }
    }

    /// Runs `job` to completion on the calling thread.
    ///
    /// Unknown or unimplemented backends fail before anything touches the
    /// filesystem. A missing or unparseable result is not an error: the run
    /// is reported with `result: None`.
    #[instrument(skip_all, name = "dispatch_job", fields(job = %job.name(), backend = %job.backend))]
    pub fn run_job(&self, job: &JobDescriptor) -> Result<JobRun, EngineError> {
        let driver = self.validate(job)?;
        let name = job.name();

        let workdir = WorkDir::prepare(job, &name, driver.input_layout())?;
        workdir.stage(&name, &job.backend, &job.options.dependent_files)?;
        workdir.stage_into(
            &driver.checkpoint_dir(&workdir.root, &job.options),
            &name,
            &job.backend,
            &job.options.checkpoint_files,
        )?;

        let ctx = JobContext {
            job: &name,
            backend: &job.backend,
            workdir: &workdir,
            options: &job.options,
            config: &self.config,
            launcher: self.launcher.as_ref(),
            parser: self.parser_for(&job.backend),
        };

        driver.prepare(&ctx)?;
        if workdir.new_run {
            info!(dir = ?workdir.root, threads = job.options.threads, "Launching job.");
            let launched = driver.invoke(&ctx);
            let cleaned = driver.cleanup(&ctx);
            launched?;
            cleaned?;
        } else {
            info!(dir = ?workdir.root, "Existing output found; collecting without launch.");
        }

        let result = match driver.collect(&ctx) {
            Ok(result) => Some(result),
            Err(e) if e.is_degraded_result() => {
                warn!(error = %e, "Job finished without a usable result.");
                None
            }
            Err(e) => return Err(e),
        };

        if job.options.cleanup {
            workdir.remove()?;
            debug!(dir = ?workdir.root, "Working directory removed.");
        }

        Ok(JobRun {
            job: name,
            backend: driver.name().to_string(),
            workdir: workdir.root,
            result,
        })
    }
}
