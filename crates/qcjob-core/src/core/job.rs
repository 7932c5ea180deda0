use super::io::traits::InputDeckWriter;
use super::pattern::list_matching;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Per-job switches consumed by the dispatcher and the backend drivers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobOptions {
    /// MPI rank / thread count passed to the launcher.
    pub threads: usize,
    /// Keep checkpoint artifacts (wavefunction, restart files) after the run.
    pub save_restart: bool,
    /// Remove the whole working directory once the result has been extracted.
    pub cleanup: bool,
    /// Explicit big-memory request; `None` defers to the configured heuristic.
    pub bigmem: Option<bool>,
    /// Scratch directory override handed to the program.
    pub scratch: Option<PathBuf>,
    pub debug: bool,
    /// Resume from a checkpoint that must already be staged.
    pub restart: bool,
    /// Run inside the input's own directory instead of creating a new one.
    pub in_place: bool,
    /// Iteration limit written into the input deck, when the backend supports it.
    pub max_steps: Option<u32>,
    /// Delete the original input deck after it was copied into the working directory.
    pub remove_input: bool,
    /// Executable override for this job only.
    pub executable: Option<PathBuf>,
    /// Parent directory for the job's working directory (defaults to the input's parent).
    pub output_dir: Option<PathBuf>,
    /// Files staged into the working directory before launch.
    pub dependent_files: Vec<PathBuf>,
    /// Restart artifacts of an earlier job, staged where the backend reads
    /// its checkpoint from (the scratch directory when one is set).
    pub checkpoint_files: Vec<PathBuf>,
}

impl JobOptions {
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            ..Default::default()
        }
    }
}

/// One unit of work: an input artifact plus the backend that should run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    pub input: PathBuf,
    pub backend: String,
    pub options: JobOptions,
}

impl JobDescriptor {
    pub fn new(input: impl Into<PathBuf>, backend: impl Into<String>, options: JobOptions) -> Self {
        Self {
            input: input.into(),
            backend: backend.into(),
            options,
        }
    }

    /// Canonical job name, see [`job_name`].
    pub fn name(&self) -> String {
        job_name(&self.input)
    }
}

/// Derives the canonical job name from an input path: the file stem for an
/// input deck (`water.inp` -> `water`), or the directory name when the input is
/// itself a directory.
pub fn job_name(input: &Path) -> String {
    if input.is_dir() {
        return input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".to_string());
    }
    input
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string())
}

/// An ordered list of jobs sharing one backend and one set of base options.
#[derive(Debug, Clone, Default)]
pub struct JobBatch {
    jobs: Vec<JobDescriptor>,
}

impl JobBatch {
    pub fn new(jobs: Vec<JobDescriptor>) -> Self {
        Self { jobs }
    }

    /// Enumerates every entry of `dir` whose name matches `pattern`, sorted by
    /// path, as one job each.
    pub fn from_directory(
        dir: &Path,
        pattern: &str,
        backend: &str,
        options: &JobOptions,
    ) -> io::Result<Self> {
        let inputs = list_matching(dir, pattern)?;
        Ok(Self::from_inputs(inputs, backend, options))
    }

    pub fn from_inputs(
        inputs: impl IntoIterator<Item = PathBuf>,
        backend: &str,
        options: &JobOptions,
    ) -> Self {
        let jobs = inputs
            .into_iter()
            .map(|input| JobDescriptor::new(input, backend, options.clone()))
            .collect();
        Self { jobs }
    }

    /// Asks each writer for its input deck inside `staging_dir` and queues the
    /// produced paths in writer order.
    pub fn from_writers(
        writers: &[&dyn InputDeckWriter],
        staging_dir: &Path,
        backend: &str,
        options: &JobOptions,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(staging_dir)?;
        let inputs = writers
            .iter()
            .map(|w| w.write(staging_dir))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self::from_inputs(inputs, backend, options))
    }

    pub fn jobs(&self) -> &[JobDescriptor] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Removes and returns the job whose input file name equals `file_name`.
    pub fn take_by_file_name(&mut self, file_name: &str) -> Option<JobDescriptor> {
        let idx = self.jobs.iter().position(|job| {
            job.input
                .file_name()
                .is_some_and(|n| n.to_string_lossy() == file_name)
        })?;
        Some(self.jobs.remove(idx))
    }

    /// Removes and returns the first job of the batch.
    pub fn take_first(&mut self) -> Option<JobDescriptor> {
        if self.jobs.is_empty() {
            None
        } else {
            Some(self.jobs.remove(0))
        }
    }

    pub fn into_jobs(self) -> Vec<JobDescriptor> {
        self.jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct FixedDeck(&'static str);

    impl InputDeckWriter for FixedDeck {
        fn write(&self, dir: &Path) -> io::Result<PathBuf> {
            let path = dir.join(format!("{}.inp", self.0));
            fs::write(&path, "&CPMD\n&END\n")?;
            Ok(path)
        }
    }

    #[test]
    fn job_name_uses_file_stem() {
        assert_eq!(job_name(Path::new("inp/water.inp")), "water");
        assert_eq!(job_name(Path::new("ethane")), "ethane");
    }

    #[test]
    fn job_name_uses_directory_name_for_directory_inputs() {
        let dir = tempdir().unwrap();
        let vasp = dir.path().join("si.bulk");
        fs::create_dir(&vasp).unwrap();
        assert_eq!(job_name(&vasp), "si.bulk");
    }

    #[test]
    fn from_directory_lists_sorted_matching_inputs() {
        let dir = tempdir().unwrap();
        for name in ["b.inp", "a.inp", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let batch =
            JobBatch::from_directory(dir.path(), "*.inp", "cpmd", &JobOptions::with_threads(2))
                .unwrap();

        let names: Vec<_> = batch.jobs().iter().map(JobDescriptor::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(batch.jobs().iter().all(|j| j.options.threads == 2));
    }

    #[test]
    fn take_by_file_name_removes_reference() {
        let mut batch = JobBatch::from_inputs(
            ["d/ref.inp", "d/a.inp", "d/b.inp"].map(PathBuf::from),
            "cpmd",
            &JobOptions::default(),
        );
        let reference = batch.take_by_file_name("ref.inp").unwrap();
        assert_eq!(reference.name(), "ref");
        assert_eq!(batch.len(), 2);
        assert!(batch.take_by_file_name("ref.inp").is_none());
    }

    #[test]
    fn from_writers_materializes_decks_in_order() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("stage");
        let w1 = FixedDeck("first");
        let w2 = FixedDeck("second");
        let batch = JobBatch::from_writers(
            &[&w1, &w2],
            &staging,
            "cpmd",
            &JobOptions::default(),
        )
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.jobs()[0].input, staging.join("first.inp"));
        assert!(staging.join("second.inp").exists());
    }
}
