//! Native Windows bindings for the registry and volume queries.
//!
//! Handles are wrapped in RAII types so every early return closes them.

mod disk;
mod handles;
mod registry;
mod utils;

pub(crate) use disk::free_space;
pub(crate) use registry::{subkeys, value};
