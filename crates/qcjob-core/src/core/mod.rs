//! # Core Module
//!
//! Stateless building blocks shared by the engine: job descriptors and batch
//! enumeration, file-name wildcards, input-deck directive editing, the process
//! launcher capability, and the collaborator interfaces (input-deck writers and
//! output parsers).
//!
//! Nothing in here knows about worker pools or dependency chains; see
//! [`crate::engine`] for that.

pub mod deck;
pub mod io;
pub mod job;
pub mod launcher;
pub mod pattern;
