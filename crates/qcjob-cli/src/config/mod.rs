//! Layered configuration: built-in defaults < TOML file < `--set KEY=VALUE`.
//! Per-job command-line flags are applied on top by the commands.

mod builder;
mod defaults;
mod file;
mod models;

pub use builder::{build_config, load_file_config};
pub use models::EffectiveConfig;

use directories::ProjectDirs;
use std::path::PathBuf;

/// `config.toml` in the platform configuration directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "qcjob", "qcjob").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Loads and merges the configuration for the given global flags.
pub fn resolve(
    explicit: Option<&std::path::Path>,
    set_values: &[String],
) -> crate::error::Result<EffectiveConfig> {
    let default = default_config_path();
    let file = load_file_config(explicit, default.as_deref())?;
    build_config(file, set_values)
}
