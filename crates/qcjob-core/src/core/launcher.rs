//! The "run external job" capability.
//!
//! Backend drivers never spawn processes themselves; they describe the
//! invocation as a [`LaunchRequest`] and hand it to a [`ProcessLauncher`]. The
//! default [`MpiLauncher`] blocks the calling thread until the child exits,
//! which is what the worker pool expects. Swapping in a different launcher
//! (non-blocking, remote, or a test double) touches neither the drivers nor the
//! scheduling code.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Rank count for the MPI wrapper; `None` runs the executable directly.
    pub ranks: Option<usize>,
    pub working_dir: PathBuf,
    /// File receiving the child's standard output.
    pub stdout: PathBuf,
    pub timeout: Option<Duration>,
}

impl LaunchRequest {
    pub fn new(executable: impl Into<PathBuf>, working_dir: &Path, stdout: PathBuf) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            ranks: None,
            working_dir: working_dir.to_path_buf(),
            stdout,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn ranks(mut self, ranks: usize) -> Self {
        self.ranks = Some(ranks.max(1));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Exit code, `None` if the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl LaunchOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            timed_out: false,
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open output file '{path}': {source}", path = path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed while waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Runs an external program to completion.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome, LaunchError>;
}

/// Launches through `<prefix...> <ranks> <executable> <args...>`, e.g.
/// `mpirun -np 4 cpmd.x water.inp`, with stdout redirected to a file.
#[derive(Debug, Clone, Default)]
pub struct MpiLauncher {
    prefix: Vec<String>,
}

impl MpiLauncher {
    pub fn new(prefix: Vec<String>) -> Self {
        Self { prefix }
    }

    /// Full argument vector for `request`, program first.
    pub fn command_line(&self, request: &LaunchRequest) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.prefix.len() + request.args.len() + 2);
        if let (Some(ranks), false) = (request.ranks, self.prefix.is_empty()) {
            argv.extend(self.prefix.iter().cloned());
            argv.push(ranks.to_string());
        }
        argv.push(request.executable.to_string_lossy().into_owned());
        argv.extend(request.args.iter().cloned());
        argv
    }
}

impl ProcessLauncher for MpiLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome, LaunchError> {
        let argv = self.command_line(request);
        let program = argv.join(" ");
        debug!(command = %program, cwd = ?request.working_dir, "Launching external program.");

        let out = File::create(&request.stdout).map_err(|e| LaunchError::Output {
            path: request.stdout.clone(),
            source: e,
        })?;

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .spawn()
            .map_err(|e| LaunchError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        let Some(timeout) = request.timeout else {
            let status = child.wait().map_err(|e| LaunchError::Wait {
                program: program.clone(),
                source: e,
            })?;
            return Ok(LaunchOutcome {
                exit_code: status.code(),
                timed_out: false,
            });
        };

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Ok(LaunchOutcome {
                        exit_code: status.code(),
                        timed_out: false,
                    });
                }
                Ok(None) if started.elapsed() >= timeout => {
                    warn!(command = %program, ?timeout, "External program exceeded its time limit; killing it.");
                    let _ = child.kill();
                    let status = child.wait().map_err(|e| LaunchError::Wait {
                        program: program.clone(),
                        source: e,
                    })?;
                    return Ok(LaunchOutcome {
                        exit_code: status.code(),
                        timed_out: true,
                    });
                }
                Ok(None) => std::thread::sleep(TIMEOUT_POLL_INTERVAL),
                Err(e) => {
                    return Err(LaunchError::Wait {
                        program,
                        source: e,
                    });
                }
            }
        }
    }
}
