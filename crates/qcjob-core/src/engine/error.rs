use crate::core::io::traits::ParseError;
use crate::core::launcher::LaunchError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Program '{backend}' is not implemented")]
    BackendNotImplemented { backend: String },

    #[error("Program '{backend}' is not recognized")]
    BackendUnknown { backend: String },

    #[error("Precondition failed for job '{job}' ({backend}): {message}")]
    Precondition {
        job: String,
        backend: String,
        message: String,
    },

    #[error("Job '{job}' ({backend}) failed: {message}")]
    Execution {
        job: String,
        backend: String,
        message: String,
    },

    #[error("Job '{job}' ({backend}) could not launch: {source}")]
    Launch {
        job: String,
        backend: String,
        #[source]
        source: LaunchError,
    },

    #[error("Job '{job}' ({backend}) produced no result at '{path}'", path = path.display())]
    ResultMissing {
        job: String,
        backend: String,
        path: PathBuf,
    },

    #[error("Job '{job}' ({backend}) output could not be parsed: {source}")]
    Parse {
        job: String,
        backend: String,
        #[source]
        source: ParseError,
    },

    #[error("File I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that abort a whole batch or scan instead of a single job.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::BackendNotImplemented { .. }
                | Self::BackendUnknown { .. }
                | Self::Precondition { .. }
        )
    }

    /// Errors that only degrade a job's result to "no usable output".
    pub fn is_degraded_result(&self) -> bool {
        matches!(self, Self::ResultMissing { .. } | Self::Parse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_propagation_policy() {
        assert!(EngineError::BackendNotImplemented {
            backend: "gaussian".into()
        }
        .is_fatal());
        assert!(EngineError::Precondition {
            job: "a".into(),
            backend: "cpmd".into(),
            message: "missing RESTART".into(),
        }
        .is_fatal());

        let exec = EngineError::Execution {
            job: "a".into(),
            backend: "cpmd".into(),
            message: "exit code 1".into(),
        };
        assert!(!exec.is_fatal());
        assert!(!exec.is_degraded_result());

        let missing = EngineError::ResultMissing {
            job: "a".into(),
            backend: "vasp".into(),
            path: PathBuf::from("a/vasprun.xml"),
        };
        assert!(missing.is_degraded_result());
        assert!(!missing.is_fatal());
    }

    #[test]
    fn messages_name_job_and_backend() {
        let err = EngineError::Execution {
            job: "water".into(),
            backend: "cpmd".into(),
            message: "exit code 137".into(),
        };
        assert_eq!(err.to_string(), "Job 'water' (cpmd) failed: exit code 137");
        assert_eq!(
            EngineError::BackendUnknown {
                backend: "orca".into()
            }
            .to_string(),
            "Program 'orca' is not recognized"
        );
    }
}
