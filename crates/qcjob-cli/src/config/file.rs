use crate::error::{CliError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The on-disk configuration. Every key is optional; missing ones fall back
/// to the built-in defaults.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub default_program: Option<String>,
    /// MPI launch prefix placed before the rank count, e.g. "mpirun -np".
    pub mpi_prefix: Option<String>,
    pub memory_gb: Option<f64>,
    pub bigmem_threshold_gb: Option<f64>,
    pub job_timeout_secs: Option<u64>,
    pub cpmd2cube: Option<PathBuf>,
    pub workers: Option<usize>,
    #[serde(default)]
    pub executables: BTreeMap<String, PathBuf>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
