//! Backend drivers: one implementation of [`Backend`] per external program.
//!
//! A driver turns a prepared working directory into exactly one program
//! invocation. The dispatcher calls the four stages in order
//! (`prepare`, `invoke`, `collect`, `cleanup`) and never branches on the
//! backend's name; adding a program means writing a driver and registering it
//! in a [`BackendRegistry`].

pub mod cpmd;
pub mod vasp;

use crate::core::io::traits::{BackendResult, OutputParser};
use crate::core::job::JobOptions;
use crate::core::launcher::{LaunchOutcome, LaunchRequest, ProcessLauncher};
use crate::core::pattern::{list_matching, wildcard_match};
use crate::engine::config::RunnerConfig;
use crate::engine::error::EngineError;
use crate::engine::workdir::WorkDir;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a backend expects its input artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// A single input deck, copied into a fresh per-job directory.
    DeckFile,
    /// A directory of input files that is itself the working directory.
    Directory,
}

/// Which files of a finished job let a later job resume from its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointRule {
    /// The backend has no meaningful restart hand-off.
    None,
    /// Exactly this file must exist.
    File(&'static str),
    /// At least one file matching any of these patterns must exist.
    Glob(&'static [&'static str]),
}

impl CheckpointRule {
    /// Locates the checkpoint artifacts inside `dir`.
    ///
    /// Returns `Ok(None)` when the rule requires artifacts and none are present,
    /// and `Ok(Some(vec![]))` for [`CheckpointRule::None`].
    pub fn locate(&self, dir: &Path) -> std::io::Result<Option<Vec<PathBuf>>> {
        match self {
            Self::None => Ok(Some(Vec::new())),
            Self::File(name) => {
                let path = dir.join(name);
                Ok(path.is_file().then(|| vec![path]))
            }
            Self::Glob(patterns) => {
                if !dir.is_dir() {
                    return Ok(None);
                }
                let mut found = Vec::new();
                for pattern in *patterns {
                    for path in list_matching(dir, pattern)? {
                        if path.is_file() && !found.contains(&path) {
                            found.push(path);
                        }
                    }
                }
                found.sort();
                Ok((!found.is_empty()).then_some(found))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::None => "no checkpoint".to_string(),
            Self::File(name) => format!("'{}'", name),
            Self::Glob(patterns) => patterns
                .iter()
                .map(|p| format!("'{}'", p))
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }
}

/// Everything a driver needs to know about the job it is running.
pub struct JobContext<'a> {
    pub job: &'a str,
    pub backend: &'a str,
    pub workdir: &'a WorkDir,
    pub options: &'a JobOptions,
    pub config: &'a RunnerConfig,
    pub launcher: &'a dyn ProcessLauncher,
    pub parser: &'a dyn OutputParser,
}

impl JobContext<'_> {
    pub fn precondition(&self, message: impl Into<String>) -> EngineError {
        EngineError::Precondition {
            job: self.job.to_string(),
            backend: self.backend.to_string(),
            message: message.into(),
        }
    }

    pub fn execution(&self, message: impl Into<String>) -> EngineError {
        EngineError::Execution {
            job: self.job.to_string(),
            backend: self.backend.to_string(),
            message: message.into(),
        }
    }

    /// The job's stdout log: `<workdir>/<job>.out`.
    pub fn output_path(&self) -> PathBuf {
        self.workdir.root.join(format!("{}.out", self.job))
    }

    /// Executable for this job: the per-job override, else the configured one.
    pub fn executable(&self) -> Result<PathBuf, EngineError> {
        self.options
            .executable
            .clone()
            .or_else(|| self.config.executable_for(self.backend).map(Path::to_path_buf))
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "no executable configured for program '{}'",
                    self.backend
                ))
            })
    }

    /// Launches `request` and turns a non-zero exit or timeout into an
    /// execution error.
    pub fn run(&self, request: &LaunchRequest) -> Result<LaunchOutcome, EngineError> {
        let outcome = self
            .launcher
            .launch(request)
            .map_err(|e| EngineError::Launch {
                job: self.job.to_string(),
                backend: self.backend.to_string(),
                source: e,
            })?;
        if outcome.timed_out {
            return Err(self.execution("killed after exceeding the job time limit"));
        }
        match outcome.exit_code {
            Some(0) => Ok(outcome),
            Some(code) => Err(self.execution(format!("exited with status {}", code))),
            None => Err(self.execution("terminated by a signal")),
        }
    }
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn input_layout(&self) -> InputLayout {
        InputLayout::DeckFile
    }

    /// Files removed after every run.
    fn transient_files(&self) -> &'static [&'static str] {
        &[]
    }

    /// Checkpoint files removed unless the job asked to keep restart artifacts.
    fn checkpoint_files(&self) -> &'static [&'static str] {
        &[]
    }

    fn checkpoint_rule(&self) -> CheckpointRule {
        CheckpointRule::None
    }

    /// Directory the program reads and writes its checkpoint artifacts in,
    /// for a job running in `root`. Captured, staged and verified there.
    fn checkpoint_dir(&self, root: &Path, options: &JobOptions) -> PathBuf {
        options.scratch.clone().unwrap_or_else(|| root.to_path_buf())
    }

    /// The parseable result artifact of a finished run.
    fn result_artifact(&self, ctx: &JobContext) -> PathBuf {
        ctx.output_path()
    }

    /// Working-directory setup that must happen before launch.
    fn prepare(&self, ctx: &JobContext) -> Result<(), EngineError> {
        self.verify_restart(ctx)
    }

    /// Runs the program once, blocking until it exits.
    fn invoke(&self, ctx: &JobContext) -> Result<(), EngineError>;

    /// Parses the result artifact with the job's output parser.
    fn collect(&self, ctx: &JobContext) -> Result<BackendResult, EngineError> {
        let artifact = self.result_artifact(ctx);
        if !artifact.exists() {
            return Err(EngineError::ResultMissing {
                job: ctx.job.to_string(),
                backend: ctx.backend.to_string(),
                path: artifact,
            });
        }
        ctx.parser
            .parse(ctx.backend, &artifact)
            .map_err(|e| EngineError::Parse {
                job: ctx.job.to_string(),
                backend: ctx.backend.to_string(),
                source: e,
            })
    }

    /// Removes transient files, and checkpoint files unless `save_restart` is set.
    fn cleanup(&self, ctx: &JobContext) -> Result<(), EngineError> {
        let mut patterns: Vec<&str> = self.transient_files().to_vec();
        if !ctx.options.save_restart {
            patterns.extend_from_slice(self.checkpoint_files());
        }
        remove_matching(&ctx.workdir.root, &patterns)
    }

    /// A restart run needs its checkpoint artifacts in place before launch.
    fn verify_restart(&self, ctx: &JobContext) -> Result<(), EngineError> {
        if !ctx.options.restart {
            return Ok(());
        }
        let location = self.checkpoint_dir(&ctx.workdir.root, ctx.options);
        let rule = self.checkpoint_rule();
        match rule
            .locate(&location)
            .map_err(|e| EngineError::io(&location, e))?
        {
            Some(_) => Ok(()),
            None => Err(ctx.precondition(format!(
                "restart requested but {} not found in '{}'",
                rule.describe(),
                location.display()
            ))),
        }
    }
}

/// Deletes every regular file in `dir` whose name matches one of `patterns`.
pub fn remove_matching(dir: &Path, patterns: &[&str]) -> Result<(), EngineError> {
    if patterns.is_empty() || !dir.is_dir() {
        return Ok(());
    }
    let entries = fs::read_dir(dir).map_err(|e| EngineError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !patterns.iter().any(|p| wildcard_match(p, name)) {
            continue;
        }
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => debug!(file = ?path, "Removed transient file."),
            Err(e) => warn!(file = ?path, error = %e, "Could not remove transient file."),
        }
    }
    Ok(())
}

enum Registration {
    Driver(Arc<dyn Backend>),
    NotImplemented,
}

/// Name-to-driver lookup table. Names are case-insensitive.
pub struct BackendRegistry {
    entries: HashMap<String, Registration>,
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, driver: Arc<dyn Backend>) -> &mut Self {
        self.entries.insert(
            driver.name().to_ascii_lowercase(),
            Registration::Driver(driver),
        );
        self
    }

    /// Registers a name that is known but has no driver; dispatching to it
    /// fails fast with [`EngineError::BackendNotImplemented`].
    pub fn register_unimplemented(&mut self, name: &str) -> &mut Self {
        self.entries
            .insert(name.to_ascii_lowercase(), Registration::NotImplemented);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Backend>, EngineError> {
        match self.entries.get(&name.to_ascii_lowercase()) {
            Some(Registration::Driver(driver)) => Ok(Arc::clone(driver)),
            Some(Registration::NotImplemented) => Err(EngineError::BackendNotImplemented {
                backend: name.to_string(),
            }),
            None => Err(EngineError::BackendUnknown {
                backend: name.to_string(),
            }),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    /// CPMD and VASP drivers, plus the known programs without a driver.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Arc::new(cpmd::Cpmd))
            .register(Arc::new(vasp::Vasp));
        for name in ["gaussian", "pwscf", "espresso", "nwchem", "gamess", "bigdft"] {
            registry.register_unimplemented(name);
        }
        registry
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted launcher standing in for real quantum-chemistry programs.

    use crate::core::launcher::{LaunchError, LaunchOutcome, LaunchRequest, ProcessLauncher};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Writes `files` into the request's working directory (or `files_dir`),
    /// writes the stdout file, and exits with 0 unless the job's input name is
    /// listed in `failing`.
    pub struct ScriptedLauncher {
        pub files: Vec<(&'static str, &'static str)>,
        pub files_dir: Option<PathBuf>,
        pub failing: Vec<String>,
        pub delay: Duration,
        pub calls: Mutex<Vec<LaunchRequest>>,
        pub in_flight: AtomicUsize,
        pub peak: AtomicUsize,
        pub sequence: AtomicUsize,
        pub finished_at: Mutex<Vec<(String, usize)>>,
        pub started_at: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedLauncher {
        pub fn new(files: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                files,
                files_dir: None,
                failing: Vec::new(),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                sequence: AtomicUsize::new(0),
                finished_at: Mutex::new(Vec::new()),
                started_at: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(mut self, job: &str) -> Self {
            self.failing.push(job.to_string());
            self
        }

        /// Writes the artifacts into `dir`, as a program honouring a scratch
        /// path would.
        pub fn files_in(mut self, dir: &Path) -> Self {
            self.files_dir = Some(dir.to_path_buf());
            self
        }

        pub fn delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Names of every job launched, derived from the stdout file name.
        pub fn launched_jobs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.ranks.is_some())
                .map(|r| stem(&r.stdout))
                .collect()
        }
    }

    fn stem(path: &Path) -> String {
        path.file_stem().unwrap().to_string_lossy().into_owned()
    }

    impl ProcessLauncher for ScriptedLauncher {
        fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome, LaunchError> {
            let job = stem(&request.stdout);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let tick = self.sequence.fetch_add(1, Ordering::SeqCst);
            self.started_at.lock().unwrap().push((job.clone(), tick));
            self.calls.lock().unwrap().push(request.clone());

            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }

            let code = if self.failing.contains(&job) { 1 } else { 0 };
            fs::write(&request.stdout, format!("{} finished\n", job)).unwrap();
            if code == 0 {
                let dir = self.files_dir.as_deref().unwrap_or(&request.working_dir);
                fs::create_dir_all(dir).unwrap();
                for (name, content) in &self.files {
                    fs::write(dir.join(name), content).unwrap();
                }
            }

            let tick = self.sequence.fetch_add(1, Ordering::SeqCst);
            self.finished_at.lock().unwrap().push((job, tick));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(LaunchOutcome::exited(code))
        }
    }
}
