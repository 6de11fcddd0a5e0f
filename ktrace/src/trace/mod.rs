//! # Trace
//!
//! Subcommands driving a probe from the command line: tracing and printing
//! its events, cleaning up its registration and reporting the tracing
//! status of the system.

pub(crate) mod cli;
pub(crate) use cli::*;

pub(crate) mod print;

#[allow(clippy::module_inception)]
pub(crate) mod trace;
