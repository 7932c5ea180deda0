use super::defaults::DefaultsConfig;
use super::file::FileConfig;
use super::models::EffectiveConfig;
use crate::error::{CliError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Merges built-in defaults < config file < `--set` overrides.
pub fn build_config(file_config: FileConfig, set_values: &[String]) -> Result<EffectiveConfig> {
    let defaults = DefaultsConfig::default();
    let file_config = apply_set_values(file_config, set_values)?;

    let mut executables = defaults.executables;
    for (program, exe) in file_config.executables {
        executables.insert(program.to_ascii_lowercase(), exe);
    }

    let workers = file_config.workers.unwrap_or(defaults.workers);
    if workers == 0 {
        return Err(CliError::Config("`workers` must be at least 1".to_string()));
    }

    Ok(EffectiveConfig {
        default_program: file_config
            .default_program
            .unwrap_or(defaults.default_program)
            .to_ascii_lowercase(),
        mpi_prefix: file_config.mpi_prefix.unwrap_or(defaults.mpi_prefix),
        memory_gb: file_config.memory_gb.unwrap_or(defaults.memory_gb),
        bigmem_threshold_gb: file_config
            .bigmem_threshold_gb
            .unwrap_or(defaults.bigmem_threshold_gb),
        job_timeout_secs: file_config.job_timeout_secs,
        cpmd2cube: file_config.cpmd2cube.unwrap_or(defaults.cpmd2cube),
        workers,
        executables,
    })
}

/// Loads the file at `explicit` (which must exist), or else the default
/// location if a file is present there.
pub fn load_file_config(explicit: Option<&Path>, default: Option<&Path>) -> Result<FileConfig> {
    match (explicit, default) {
        (Some(path), _) => FileConfig::from_file(path),
        (None, Some(path)) if path.is_file() => FileConfig::from_file(path),
        _ => Ok(FileConfig::default()),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

pub fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();
        let value_str = value_str.trim();

        match key {
            "default-program" => config.default_program = Some(value_str.to_string()),
            "mpi-prefix" => config.mpi_prefix = Some(value_str.to_string()),
            "memory-gb" => config.memory_gb = Some(parse_value(key, value_str, "float")?),
            "bigmem-threshold-gb" => {
                config.bigmem_threshold_gb = Some(parse_value(key, value_str, "float")?)
            }
            "job-timeout-secs" => {
                config.job_timeout_secs = Some(parse_value(key, value_str, "integer")?)
            }
            "cpmd2cube" => config.cpmd2cube = Some(PathBuf::from(value_str)),
            "workers" => config.workers = Some(parse_value(key, value_str, "integer")?),
            _ => match key.strip_prefix("executables.") {
                Some(program) if !program.is_empty() => {
                    config
                        .executables
                        .insert(program.to_ascii_lowercase(), PathBuf::from(value_str));
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unknown configuration key for --set: '{}'",
                        key
                    )));
                }
            },
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_without_file() {
        let cfg = build_config(FileConfig::default(), &[]).unwrap();
        assert_eq!(cfg.default_program, "cpmd");
        assert_eq!(cfg.mpi_prefix_argv(), vec!["mpirun", "-np"]);
        assert_eq!(cfg.bigmem_threshold_gb, 16.0);
        assert_eq!(cfg.executables["cpmd"], PathBuf::from("cpmd.x"));
        assert!(cfg.workers >= 1);
    }

    #[test]
    fn file_values_override_defaults_and_set_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
default-program = "VASP"
mpi-prefix = "srun -n"
memory-gb = 8.0
workers = 4

[executables]
vasp = "/opt/vasp/bin/vasp_std"
"#,
        )
        .unwrap();

        let file = load_file_config(Some(path.as_path()), None).unwrap();
        let cfg = build_config(
            file,
            &["memory-gb=64".to_string(), "executables.cpmd=/opt/cpmd.x".to_string()],
        )
        .unwrap();

        assert_eq!(cfg.default_program, "vasp");
        assert_eq!(cfg.mpi_prefix_argv(), vec!["srun", "-n"]);
        assert_eq!(cfg.memory_gb, 64.0);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.executables["vasp"], PathBuf::from("/opt/vasp/bin/vasp_std"));
        assert_eq!(cfg.executables["cpmd"], PathBuf::from("/opt/cpmd.x"));

        let runner = cfg.to_runner_config(false).unwrap();
        assert!(runner.wants_bigmem(None));
        assert_eq!(runner.default_backend, "vasp");
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default-programme = \"cpmd\"\n").unwrap();
        assert!(matches!(
            load_file_config(Some(path.as_path()), None),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn missing_default_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let absent = dir.path().join("config.toml");
        assert_eq!(
            load_file_config(None, Some(absent.as_path())).unwrap(),
            FileConfig::default()
        );
        assert!(load_file_config(Some(absent.as_path()), None).is_err());
    }

    #[test]
    fn malformed_set_values_are_rejected() {
        for bad in ["memory-gb", "memory-gb=lots", "colour=blue", "executables.=x"] {
            let result = apply_set_values(FileConfig::default(), &[bad.to_string()]);
            assert!(matches!(result, Err(CliError::Config(_))), "{}", bad);
        }
        assert!(build_config(FileConfig::default(), &["workers=0".to_string()]).is_err());
    }

    #[test]
    fn effective_config_renders_as_toml() {
        let cfg = build_config(FileConfig::default(), &["job-timeout-secs=600".to_string()]).unwrap();
        let text = cfg.to_toml().unwrap();
        assert!(text.contains("default-program = \"cpmd\""));
        assert!(text.contains("job-timeout-secs = 600"));
        assert!(text.contains("[executables]"));
    }
}
