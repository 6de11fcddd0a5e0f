//! # Core
//!
//! Core module: kernel tracing control files and the probes built on top of
//! them.

pub mod kprobe;
pub mod tracefs;
