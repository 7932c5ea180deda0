use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "qcjob - run batches of quantum-chemistry calculations (CPMD, VASP) on a bounded pool of MPI workers.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Configuration file in TOML format.
    /// Defaults to `config.toml` in the platform configuration directory.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S executables.cpmd=/opt/cpmd/cpmd.x
    #[arg(short = 'S', long = "set", global = true, value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single input through one program.
    Run(RunArgs),
    /// Run every matching input of a directory on a pool of workers.
    Batch(BatchArgs),
    /// Inspect the effective configuration.
    Config(ConfigArgs),
}

/// Options shared by `run` and `batch`.
#[derive(Args, Debug, Clone, Default)]
pub struct JobFlags {
    /// Program to run (cpmd, vasp). Defaults to `default-program` from the config.
    #[arg(short, long, value_name = "NAME")]
    pub program: Option<String>,

    /// Scratch directory handed to the program.
    #[arg(long = "scr", value_name = "DIR")]
    pub scratch: Option<PathBuf>,

    /// Ask the program for debug/benchmark output.
    #[arg(long)]
    pub debug: bool,

    /// Keep restart/checkpoint files after the run.
    #[arg(long)]
    pub save_restart: bool,

    /// Remove the whole working directory once the result is collected.
    #[arg(long)]
    pub cleanup: bool,

    /// Iteration limit written into the input deck.
    #[arg(long, value_name = "INT")]
    pub max_steps: Option<u32>,

    /// Parent directory for the per-job working directories.
    #[arg(short, long = "outdir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Executable to use instead of the configured one.
    #[arg(long = "exe", value_name = "PATH")]
    pub executable: Option<PathBuf>,

    #[command(flatten)]
    pub bigmem: BigmemFlags,
}

/// Mutually exclusive overrides for the big-memory heuristic.
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(required = false, multiple = false)]
pub struct BigmemFlags {
    /// Force the program's large-memory mode.
    #[arg(long)]
    pub bigmem: bool,
    /// Never use the program's large-memory mode.
    #[arg(long)]
    pub no_bigmem: bool,
}

impl BigmemFlags {
    pub fn as_option(self) -> Option<bool> {
        match (self.bigmem, self.no_bigmem) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input deck, or input directory for directory-based programs.
    #[arg(required = true, value_name = "INPUT")]
    pub input: PathBuf,

    /// MPI ranks for the job.
    #[arg(short = 'n', long, value_name = "NUM", default_value_t = 1)]
    pub threads: usize,

    /// Run in the input's own directory instead of a new one.
    #[arg(long)]
    pub inplace: bool,

    /// Resume from restart files already present in the working directory.
    #[arg(long)]
    pub restart: bool,

    /// Delete the original input deck after it was copied.
    #[arg(long)]
    pub remove_input: bool,

    /// Extra files copied into the working directory before launch.
    #[arg(long = "dependent", value_name = "PATH")]
    pub dependent_files: Vec<PathBuf>,

    #[command(flatten)]
    pub job: JobFlags,
}

/// Arguments for the `batch` subcommand.
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory holding the inputs.
    #[arg(default_value = "inp", value_name = "DIR")]
    pub dir: PathBuf,

    /// Wildcard selecting the inputs inside DIR.
    #[arg(long, default_value = "*.inp", value_name = "GLOB")]
    pub pattern: String,

    /// Number of jobs running at the same time.
    #[arg(short, long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// MPI ranks per job.
    #[arg(short = 'n', long, value_name = "NUM", default_value_t = 1)]
    pub threads_per_job: usize,

    /// Alchemical scan: run a reference job first and restart all others from it.
    #[arg(long)]
    pub alchemy: bool,

    /// File name of the reference input (implies --alchemy). Defaults to the first input.
    #[arg(long = "ref", value_name = "FILE")]
    pub reference: Option<String>,

    /// MPI ranks for the reference job. Defaults to workers x threads per job.
    #[arg(long, value_name = "NUM")]
    pub reference_threads: Option<usize>,

    /// Print the batch summary as TOML when done.
    #[arg(long)]
    pub summary: bool,

    #[command(flatten)]
    pub job: JobFlags,
}

/// Arguments for the `config` subcommand.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the path of the configuration file that would be loaded.
    Path,
    /// Print the merged effective configuration.
    Show,
}
