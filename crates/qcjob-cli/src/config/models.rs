use crate::error::{CliError, Result};
use qcjob::engine::config::{RunnerConfig, RunnerConfigBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Configuration after defaults, file and `--set` overrides were merged.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct EffectiveConfig {
    pub default_program: String,
    pub mpi_prefix: String,
    pub memory_gb: f64,
    pub bigmem_threshold_gb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
    pub cpmd2cube: PathBuf,
    pub workers: usize,
    pub executables: BTreeMap<String, PathBuf>,
}

impl EffectiveConfig {
    pub fn mpi_prefix_argv(&self) -> Vec<String> {
        self.mpi_prefix.split_whitespace().map(str::to_string).collect()
    }

    pub fn to_runner_config(&self, quiet: bool) -> Result<RunnerConfig> {
        let mut builder = RunnerConfigBuilder::new()
            .default_backend(&self.default_program)
            .mpi_prefix(self.mpi_prefix_argv())
            .density_converter(Some(self.cpmd2cube.clone()))
            .memory_gb(self.memory_gb)
            .bigmem_threshold_gb(self.bigmem_threshold_gb)
            .job_timeout_secs(self.job_timeout_secs)
            .quiet(quiet);
        for (program, exe) in &self.executables {
            builder = builder.executable(program, exe);
        }
        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CliError::Other(e.into()))
    }
}
