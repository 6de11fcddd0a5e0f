//! # ktrace
//!
//! Exposes kernel dynamic probes (kprobes) and tracepoints as a stream of
//! typed events, using the ftrace text interface.
//!
//! ```no_run
//! use ktrace::core::kprobe::{EventResult, Probe};
//!
//! let probe = Probe::new("exec", "sys_execve", &["sched/sched_process_exec"])?;
//! probe.enable()?;
//!
//! let events = probe.events();
//! if let EventResult::Event(event) = events.recv_timeout(std::time::Duration::from_secs(1))? {
//!     println!("{} {}", event.pid, event.name);
//! }
//!
//! probe.disable()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod core;
pub mod helpers;

// Re-export the events crate so events appear as a module of this crate.
pub use events;
