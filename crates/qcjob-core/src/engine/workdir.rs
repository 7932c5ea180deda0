use crate::core::job::JobDescriptor;
use crate::engine::backends::InputLayout;
use crate::engine::error::EngineError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A job's resolved working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    /// Directory the program runs in.
    pub root: PathBuf,
    /// Input artifact as seen from inside `root`.
    pub input: PathBuf,
    /// False when `root` already holds this job's output, so the launch is skipped.
    pub new_run: bool,
    /// Whether `root` was created for this job (and may therefore be removed).
    pub owned: bool,
}

impl WorkDir {
    /// Computes where `job` would run without touching the filesystem.
    pub fn plan(job: &JobDescriptor, name: &str, layout: InputLayout) -> PathBuf {
        match layout {
            InputLayout::Directory => job.input.clone(),
            InputLayout::DeckFile if job.options.in_place => parent_of(&job.input),
            InputLayout::DeckFile => job
                .options
                .output_dir
                .clone()
                .unwrap_or_else(|| parent_of(&job.input))
                .join(name),
        }
    }

    /// Resolves and, unless running in place, creates the job's working
    /// directory with a copy of the input deck named `<name>.inp`.
    pub fn prepare(
        job: &JobDescriptor,
        name: &str,
        layout: InputLayout,
    ) -> Result<Self, EngineError> {
        let missing_input = || EngineError::Precondition {
            job: name.to_string(),
            backend: job.backend.clone(),
            message: format!("input '{}' does not exist", job.input.display()),
        };
        let output = format!("{}.out", name);
        let root = Self::plan(job, name, layout);

        match layout {
            InputLayout::Directory => {
                if !job.input.is_dir() {
                    return Err(missing_input());
                }
                Ok(Self {
                    new_run: !root.join(&output).exists(),
                    input: root.clone(),
                    root,
                    owned: false,
                })
            }
            InputLayout::DeckFile if job.options.in_place => {
                if !job.input.is_file() {
                    return Err(missing_input());
                }
                Ok(Self {
                    new_run: !root.join(&output).exists(),
                    input: job.input.clone(),
                    root,
                    owned: false,
                })
            }
            InputLayout::DeckFile => {
                let deck = root.join(format!("{}.inp", name));
                if root.join(&output).exists() {
                    info!(job = name, dir = ?root, "Output already present; skipping launch.");
                    return Ok(Self {
                        root,
                        input: deck,
                        new_run: false,
                        owned: true,
                    });
                }
                if !job.input.is_file() {
                    return Err(missing_input());
                }
                fs::create_dir_all(&root).map_err(|e| EngineError::io(&root, e))?;
                if !same_file(&job.input, &deck) {
                    fs::copy(&job.input, &deck).map_err(|e| EngineError::io(&deck, e))?;
                    if job.options.remove_input {
                        fs::remove_file(&job.input).map_err(|e| EngineError::io(&job.input, e))?;
                    }
                }
                debug!(job = name, dir = ?root, "Working directory ready.");
                Ok(Self {
                    root,
                    input: deck,
                    new_run: true,
                    owned: true,
                })
            }
        }
    }

    /// Copies each dependent file into the working directory under its own
    /// file name. Returns the staged paths.
    pub fn stage(&self, job: &str, backend: &str, files: &[PathBuf]) -> Result<Vec<PathBuf>, EngineError> {
        self.stage_into(&self.root, job, backend, files)
    }

    /// Like [`WorkDir::stage`], but into `dir` (created if needed), e.g. a
    /// scratch directory where the program looks for its restart files.
    pub fn stage_into(
        &self,
        dir: &Path,
        job: &str,
        backend: &str,
        files: &[PathBuf],
    ) -> Result<Vec<PathBuf>, EngineError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;
        let mut staged = Vec::with_capacity(files.len());
        for src in files {
            let Some(file_name) = src.file_name() else {
                return Err(EngineError::Configuration(format!(
                    "dependent file '{}' has no file name",
                    src.display()
                )));
            };
            if !src.is_file() {
                return Err(EngineError::Precondition {
                    job: job.to_string(),
                    backend: backend.to_string(),
                    message: format!("dependent file '{}' does not exist", src.display()),
                });
            }
            let dst = dir.join(file_name);
            if !same_file(src, &dst) {
                fs::copy(src, &dst).map_err(|e| EngineError::io(&dst, e))?;
            }
            debug!(job, file = ?dst, "Staged dependent file.");
            staged.push(dst);
        }
        Ok(staged)
    }

    /// Removes the whole working directory. Only a directory created for this
    /// job can be removed; anything else is the user's input.
    pub fn remove(&self) -> Result<(), EngineError> {
        if !self.owned {
            return Err(EngineError::Configuration(format!(
                "refusing to remove '{}': it was not created for the job",
                self.root.display()
            )));
        }
        fs::remove_dir_all(&self.root).map_err(|e| EngineError::io(&self.root, e))
    }
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::JobOptions;
    use tempfile::tempdir;

    fn deck_job(dir: &Path, name: &str, options: JobOptions) -> JobDescriptor {
        let input = dir.join(format!("{}.inp", name));
        fs::write(&input, "&CPMD\n&END\n").unwrap();
        JobDescriptor::new(input, "cpmd", options)
    }

    #[test]
    fn deck_job_gets_isolated_directory_named_after_job() {
        let dir = tempdir().unwrap();
        let job = deck_job(dir.path(), "water", JobOptions::default());

        let wd = WorkDir::prepare(&job, "water", InputLayout::DeckFile).unwrap();
        assert_eq!(wd.root, dir.path().join("water"));
        assert_eq!(wd.input, dir.path().join("water/water.inp"));
        assert!(wd.input.is_file());
        assert!(wd.new_run);
        assert!(wd.owned);
        assert!(job.input.exists());
    }

    #[test]
    fn output_dir_and_remove_input_are_honoured() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("runs");
        let options = JobOptions {
            output_dir: Some(out.clone()),
            remove_input: true,
            ..Default::default()
        };
        let job = deck_job(dir.path(), "h2", options);

        let wd = WorkDir::prepare(&job, "h2", InputLayout::DeckFile).unwrap();
        assert_eq!(wd.root, out.join("h2"));
        assert!(wd.input.is_file());
        assert!(!job.input.exists());
    }

    #[test]
    fn in_place_uses_input_directory_without_creating_anything() {
        let dir = tempdir().unwrap();
        let options = JobOptions {
            in_place: true,
            ..Default::default()
        };
        let job = deck_job(dir.path(), "co2", options);

        let wd = WorkDir::prepare(&job, "co2", InputLayout::DeckFile).unwrap();
        assert_eq!(wd.root, dir.path());
        assert_eq!(wd.input, job.input);
        assert!(!wd.owned);
        assert!(!dir.path().join("co2").exists());
    }

    #[test]
    fn existing_output_marks_run_as_not_new() {
        let dir = tempdir().unwrap();
        let job = deck_job(dir.path(), "nh3", JobOptions::default());
        fs::create_dir(dir.path().join("nh3")).unwrap();
        fs::write(dir.path().join("nh3/nh3.out"), "done").unwrap();

        let wd = WorkDir::prepare(&job, "nh3", InputLayout::DeckFile).unwrap();
        assert!(!wd.new_run);
    }

    #[test]
    fn missing_input_is_a_precondition_failure() {
        let dir = tempdir().unwrap();
        let job = JobDescriptor::new(dir.path().join("ghost.inp"), "cpmd", JobOptions::default());
        let err = WorkDir::prepare(&job, "ghost", InputLayout::DeckFile).unwrap_err();
        assert!(matches!(err, EngineError::Precondition { .. }));
    }

    #[test]
    fn directory_layout_runs_in_the_input_directory() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("si");
        fs::create_dir(&input).unwrap();
        let job = JobDescriptor::new(&input, "vasp", JobOptions::default());

        let wd = WorkDir::prepare(&job, "si", InputLayout::Directory).unwrap();
        assert_eq!(wd.root, input);
        assert!(!wd.owned);
    }

    #[test]
    fn stage_copies_dependent_files_and_rejects_missing_ones() {
        let dir = tempdir().unwrap();
        let job = deck_job(dir.path(), "a", JobOptions::default());
        let wd = WorkDir::prepare(&job, "a", InputLayout::DeckFile).unwrap();

        let restart = dir.path().join("RESTART");
        fs::write(&restart, "wavefunction").unwrap();
        let staged = wd.stage("a", "cpmd", &[restart.clone()]).unwrap();
        assert_eq!(staged, vec![wd.root.join("RESTART")]);
        assert_eq!(fs::read_to_string(&staged[0]).unwrap(), "wavefunction");

        fs::remove_file(&restart).unwrap();
        let err = wd.stage("a", "cpmd", &[restart]).unwrap_err();
        assert!(matches!(err, EngineError::Precondition { .. }));
    }

    #[test]
    fn stage_into_creates_the_target_directory() {
        let dir = tempdir().unwrap();
        let job = deck_job(dir.path(), "c", JobOptions::default());
        let wd = WorkDir::prepare(&job, "c", InputLayout::DeckFile).unwrap();
        let restart = dir.path().join("RESTART");
        fs::write(&restart, "wf").unwrap();

        let scratch = dir.path().join("scr/c");
        let staged = wd.stage_into(&scratch, "c", "cpmd", &[restart.clone()]).unwrap();
        assert_eq!(staged, vec![scratch.join("RESTART")]);
        assert!(!wd.root.join("RESTART").exists());

        // Staging a file onto itself leaves it in place.
        let again = wd.stage_into(&scratch, "c", "cpmd", &staged).unwrap();
        assert_eq!(fs::read_to_string(&again[0]).unwrap(), "wf");
    }

    #[test]
    fn remove_refuses_directories_it_did_not_create() {
        let dir = tempdir().unwrap();
        let job = deck_job(dir.path(), "b", JobOptions::default());
        let wd = WorkDir::prepare(&job, "b", InputLayout::DeckFile).unwrap();
        wd.remove().unwrap();
        assert!(!wd.root.exists());

        let shared = WorkDir {
            root: dir.path().to_path_buf(),
            input: job.input.clone(),
            new_run: true,
            owned: false,
        };
        let err = shared.remove().unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(job.input.exists());
    }
}
