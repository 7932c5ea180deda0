use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct DefaultsConfig {
    pub default_program: String,
    pub mpi_prefix: String,
    pub memory_gb: f64,
    pub bigmem_threshold_gb: f64,
    pub cpmd2cube: PathBuf,
    pub executables: BTreeMap<String, PathBuf>,
    pub workers: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let executables = [("cpmd", "cpmd.x"), ("vasp", "vasp")]
            .into_iter()
            .map(|(name, exe)| (name.to_string(), PathBuf::from(exe)))
            .collect();
        Self {
            default_program: "cpmd".to_string(),
            mpi_prefix: "mpirun -np".to_string(),
            memory_gb: 0.0,
            bigmem_threshold_gb: qcjob::engine::config::DEFAULT_BIGMEM_THRESHOLD_GB,
            cpmd2cube: PathBuf::from("cpmd2cube.x"),
            executables,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}
