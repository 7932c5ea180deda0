//! # Workflows Module
//!
//! High-level entry points that tie a batch description to the engine.
//!
//! - **Batch Workflow** ([`batch`]) - Enumerates a batch and runs it either
//!   through the worker pool or as an alchemical scan gated on a reference job.

pub mod batch;
