//! Interfaces to the program-specific collaborators: input-deck writers and
//! output parsers. Their formats live outside this crate; the engine only calls
//! through these traits.

pub mod traits;
