//! # Tracefs
//!
//! Kernel tracing control files and their abstraction.

// Re-export tracefs.rs
#[allow(clippy::module_inception)]
pub mod tracefs;
pub use tracefs::*;

#[cfg(test)]
pub(crate) mod testing;
