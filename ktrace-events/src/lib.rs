//! # ktrace events
//!
//! This crate contains the definition of the events delivered by ktrace probes
//! as well as the parsing of the raw ftrace records they are built from and
//! helpers to display them.

pub mod events;
pub use events::*;

pub mod display;
pub use display::*;

pub mod trace;
pub use trace::*;
