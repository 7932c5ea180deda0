//! # qcjob
//!
//! Orchestrates large batches of independent, long-running quantum-chemistry
//! calculations: each job is an external program run in its own working
//! directory, a bounded pool of workers drains the batch, and alchemical scans
//! gate a wave of dependent jobs on one reference job's checkpoint files.
//!
//! ## Layers
//!
//! - **[`core`]** holds stateless pieces: job descriptors, batch enumeration,
//!   input-deck editing, the process launcher capability and the collaborator
//!   traits for input writers and output parsers.
//!
//! - **[`engine`]** holds the orchestration: immutable runner configuration,
//!   backend drivers and their registry, the dispatcher, the worker pool, the
//!   dependency-chain controller and a generic ordered parallel map.
//!
//! - **[`workflows`]** is the entry point most callers want: describe a batch,
//!   call [`workflows::batch::run`].

pub mod core;
pub mod engine;
pub mod workflows;
