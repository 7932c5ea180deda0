use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configured memory above which programs are asked for their large-memory mode.
pub const DEFAULT_BIGMEM_THRESHOLD_GB: f64 = 16.0;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Process-wide settings read by the dispatcher and the backend drivers.
///
/// Built once at program start and shared read-only (usually behind an `Arc`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerConfig {
    pub default_backend: String,
    /// MPI wrapper argv placed before the rank count, e.g. `["mpirun", "-np"]`.
    pub mpi_prefix: Vec<String>,
    /// Executable per backend name (lowercase).
    pub executables: BTreeMap<String, PathBuf>,
    /// CPMD density-to-cube converter, run after a job that wrote `DENSITY`.
    pub density_converter: Option<PathBuf>,
    pub memory_gb: f64,
    pub bigmem_threshold_gb: f64,
    pub quiet: bool,
    /// Per-job wall-clock limit; `None` waits for the child indefinitely.
    pub job_timeout_secs: Option<u64>,
}

impl RunnerConfig {
    pub fn executable_for(&self, backend: &str) -> Option<&Path> {
        self.executables
            .get(&backend.to_ascii_lowercase())
            .map(PathBuf::as_path)
    }

    /// Big-memory decision: an explicit request wins, otherwise the configured
    /// memory must exceed the threshold.
    pub fn wants_bigmem(&self, explicit: Option<bool>) -> bool {
        explicit.unwrap_or(self.memory_gb > self.bigmem_threshold_gb)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Default)]
pub struct RunnerConfigBuilder {
    default_backend: Option<String>,
    mpi_prefix: Option<Vec<String>>,
    executables: BTreeMap<String, PathBuf>,
    density_converter: Option<PathBuf>,
    memory_gb: Option<f64>,
    bigmem_threshold_gb: Option<f64>,
    quiet: bool,
    job_timeout_secs: Option<u64>,
}

impl RunnerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_backend(mut self, backend: impl Into<String>) -> Self {
        self.default_backend = Some(backend.into());
        self
    }
    pub fn mpi_prefix(mut self, prefix: Vec<String>) -> Self {
        self.mpi_prefix = Some(prefix);
        self
    }
    pub fn executable(mut self, backend: &str, path: impl Into<PathBuf>) -> Self {
        self.executables
            .insert(backend.to_ascii_lowercase(), path.into());
        self
    }
    pub fn density_converter(mut self, path: Option<PathBuf>) -> Self {
        self.density_converter = path;
        self
    }
    pub fn memory_gb(mut self, memory: f64) -> Self {
        self.memory_gb = Some(memory);
        self
    }
    pub fn bigmem_threshold_gb(mut self, threshold: f64) -> Self {
        self.bigmem_threshold_gb = Some(threshold);
        self
    }
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
    pub fn job_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<RunnerConfig, ConfigError> {
        let default_backend = self
            .default_backend
            .ok_or(ConfigError::MissingParameter("default_backend"))?
            .to_ascii_lowercase();
        let mpi_prefix = self
            .mpi_prefix
            .ok_or(ConfigError::MissingParameter("mpi_prefix"))?;
        let memory_gb = self.memory_gb.unwrap_or(0.0);
        if memory_gb.is_nan() || memory_gb < 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "memory_gb",
                reason: format!("must be a non-negative number, got {}", memory_gb),
            });
        }
        if self.job_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: "job_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(RunnerConfig {
            default_backend,
            mpi_prefix,
            executables: self.executables,
            density_converter: self.density_converter,
            memory_gb,
            bigmem_threshold_gb: self
                .bigmem_threshold_gb
                .unwrap_or(DEFAULT_BIGMEM_THRESHOLD_GB),
            quiet: self.quiet,
            job_timeout_secs: self.job_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RunnerConfigBuilder {
        RunnerConfigBuilder::new()
            .default_backend("CPMD")
            .mpi_prefix(vec!["mpirun".into(), "-np".into()])
    }

    #[test]
    fn build_requires_backend_and_prefix() {
        assert_eq!(
            RunnerConfigBuilder::new().build().unwrap_err(),
            ConfigError::MissingParameter("default_backend")
        );
        assert_eq!(
            RunnerConfigBuilder::new()
                .default_backend("cpmd")
                .build()
                .unwrap_err(),
            ConfigError::MissingParameter("mpi_prefix")
        );
    }

    #[test]
    fn build_applies_defaults_and_normalizes_names() {
        let cfg = base().executable("VASP", "/opt/vasp").build().unwrap();
        assert_eq!(cfg.default_backend, "cpmd");
        assert_eq!(cfg.bigmem_threshold_gb, DEFAULT_BIGMEM_THRESHOLD_GB);
        assert_eq!(cfg.executable_for("vasp"), Some(Path::new("/opt/vasp")));
        assert_eq!(cfg.executable_for("Vasp"), Some(Path::new("/opt/vasp")));
        assert_eq!(cfg.job_timeout(), None);
    }

    #[test]
    fn bigmem_heuristic_uses_threshold_unless_overridden() {
        let small = base().memory_gb(16.0).build().unwrap();
        assert!(!small.wants_bigmem(None));
        assert!(small.wants_bigmem(Some(true)));

        let large = base().memory_gb(32.0).build().unwrap();
        assert!(large.wants_bigmem(None));
        assert!(!large.wants_bigmem(Some(false)));
    }

    #[test]
    fn build_rejects_invalid_values() {
        assert!(matches!(
            base().memory_gb(-1.0).build(),
            Err(ConfigError::InvalidValue { name: "memory_gb", .. })
        ));
        assert!(matches!(
            base().job_timeout_secs(Some(0)).build(),
            Err(ConfigError::InvalidValue { name: "job_timeout_secs", .. })
        ));
    }
}
