//! # Cli
//!
//! Command line definition of ktrace and the subcommand plumbing.

// Re-export cli.rs
#[allow(clippy::module_inception)]
pub(crate) mod cli;
pub(crate) use cli::*;
