//! # Engine Module
//!
//! Stateful orchestration of external quantum-chemistry jobs: configuration,
//! backend drivers, working directories, and the schedulers that drive them.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - The immutable [`config::RunnerConfig`]
//!   built once at startup and shared by every worker
//! - **Backends** ([`backends`]) - One driver per external program behind the
//!   [`backends::Backend`] trait, looked up by name in a registry
//! - **Working Directories** ([`workdir`]) - Per-job directory creation, deck
//!   copying and dependent-file staging
//! - **Dispatcher** ([`dispatcher`]) - Runs a single job through its driver
//! - **Worker Pool** ([`pool`]) - Drains a batch on a fixed number of workers
//! - **Dependency Chains** ([`chain`]) - Reference-then-dependents alchemical scans
//! - **Parallel Map** ([`parallel`]) - Ordered map for CPU-bound auxiliary work
//! - **Progress Monitoring** ([`progress`]) - Event callbacks for front ends
//! - **Error Handling** ([`error`]) - The error taxonomy and its propagation policy
//!
//! ## Concurrency
//!
//! Each worker blocks on its job's child process; parallelism comes from
//! running several workers, not from overlapping work inside one. The only
//! in-memory structure shared between workers is the job queue.

pub mod backends;
pub mod chain;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod parallel;
pub mod pool;
pub mod progress;
pub mod workdir;
