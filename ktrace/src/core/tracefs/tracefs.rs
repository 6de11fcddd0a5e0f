//! # Tracefs
//!
//! Access to the kernel tracing control files. All accesses go through the
//! `ControlSurface` trait so the probe logic can run against something else
//! than the real pseudo-files.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use log::debug;

/// Default location of the tracing directory (debugfs mount).
pub const TRACING_DIR: &str = "/sys/kernel/debug/tracing";
/// File reporting if ftrace is enabled system wide.
pub const STATUS_FILE: &str = "/proc/sys/kernel/ftrace_enabled";

/// Location of the tracing control files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracefsLayout {
    tracing_dir: PathBuf,
    status_file: PathBuf,
}

impl Default for TracefsLayout {
    fn default() -> Self {
        Self::new(TRACING_DIR, STATUS_FILE)
    }
}

impl TracefsLayout {
    pub fn new<P, Q>(tracing_dir: P, status_file: Q) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self {
            tracing_dir: tracing_dir.into(),
            status_file: status_file.into(),
        }
    }

    pub fn tracing_dir(&self) -> &Path {
        &self.tracing_dir
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    /// Dynamic probes registration file.
    pub fn kprobe_events(&self) -> PathBuf {
        self.tracing_dir.join("kprobe_events")
    }

    /// Shared stream of trace records.
    pub fn trace_pipe(&self) -> PathBuf {
        self.tracing_dir.join("trace_pipe")
    }

    /// Enable file of an event, given as `<category>/<event>`.
    pub fn event_enable(&self, event: &str) -> PathBuf {
        self.tracing_dir.join("events").join(event).join("enable")
    }

    /// Enable file of a dynamic probe registered in the `kprobes` group.
    pub fn kprobe_enable(&self, name: &str) -> PathBuf {
        self.event_enable(&format!("kprobes/{name}"))
    }
}

/// Operations needed on the kernel tracing control files.
pub trait ControlSurface: Send + Sync {
    /// Read the full content of a file.
    fn read(&self, path: &Path) -> io::Result<String>;
    /// Replace the content of a file.
    fn write(&self, path: &Path, data: &str) -> io::Result<()>;
    /// Append data to a file.
    fn append(&self, path: &Path, data: &str) -> io::Result<()>;
    /// Open a file for streaming reads.
    fn open_stream(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>>;
}

/// File backed control surface, used on a live system.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tracefs;

impl ControlSurface for Tracefs {
    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, data: &str) -> io::Result<()> {
        debug!("Writing {data:?} to {}", path.display());
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)?
            .write_all(data.as_bytes())
    }

    fn append(&self, path: &Path, data: &str) -> io::Result<()> {
        debug!("Appending {data:?} to {}", path.display());
        OpenOptions::new()
            .append(true)
            .open(path)?
            .write_all(data.as_bytes())
    }

    fn open_stream(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// Is the ftrace framework available on this system? A status file which
/// can't be read counts as unavailable.
pub fn available(surface: &dyn ControlSurface, layout: &TracefsLayout) -> bool {
    match surface.read(layout.status_file()) {
        Ok(status) => status.trim_matches(&['\r', '\n', '\t', ' '][..]) == "1",
        Err(e) => {
            debug!("Could not read {}: {e}", layout.status_file().display());
            false
        }
    }
}
