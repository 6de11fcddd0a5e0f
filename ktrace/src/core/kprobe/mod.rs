//! # Kprobe
//!
//! Dynamic kernel probes, driven through tracefs, and the delivery of their
//! records as events.

pub mod descriptor;
pub use descriptor::*;

pub mod filter;
pub use filter::*;

pub mod probe;
pub use probe::*;

pub mod reader;
pub use reader::*;
