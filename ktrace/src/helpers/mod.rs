//! # Helpers
//!
//! Process wide helpers: logging and termination handling.

pub mod logger;
pub mod signals;
