//! # Probe
//!
//! A dynamic kernel probe on a syscall, with optional sub-events, delivering
//! the records it matches as events.
//!
//! Lifecycle of a probe:
//! - `enable()`: turns on the sub-events, registers the probe in the kernel,
//!   turns it on, opens the trace pipe and starts a worker thread filtering
//!   and parsing its lines.
//! - `reset()`: turns everything off and removes the kernel registration,
//!   without touching the worker. Also useful to clean up stale registrations.
//! - `disable()`: `reset()` followed by stopping the worker.
//!
//! Partially applied kernel changes are never rolled back when one of those
//! steps fails; use `reset()` for this.

use std::{
    collections::HashMap,
    io,
    path::PathBuf,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError},
        Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use log::{debug, error, info};

use super::{
    descriptor::{descriptor, map_sub_events},
    filter::Selector,
    reader::{LineReader, PipeMsg, Stopper},
};
use crate::{
    core::tracefs::{available, ControlSurface, Tracefs, TracefsLayout},
    events::Event,
};

/// Probe specific errors. They are reported through `anyhow::Error` and can
/// be retrieved using `downcast_ref`.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    /// The ftrace framework can't be used on this system.
    #[error("FTRACE kernel framework not available on this system")]
    Unavailable,
    /// A sub-event is not given as `<category>/<event>` or `<event>`.
    #[error("Invalid event {0:?} (expected <category>/<event>)")]
    InvalidEvent(String),
    /// Writing to a control file failed.
    #[error("Error while trying to {step} ({}): {source}", .path.display())]
    Control {
        step: String,
        path: PathBuf,
        source: io::Error,
    },
    /// The trace pipe could not be opened.
    #[error("Error while opening {}: {source}", .path.display())]
    Pipe { path: PathBuf, source: io::Error },
}

/// The return value of EventStream::recv_timeout()
#[derive(Debug)]
pub enum EventResult {
    /// An event was retrieved.
    Event(Event),
    /// The timeout went off but a new attempt to retrieve an event might succeed.
    Timeout,
}

/// Reading end of the events produced by a probe. It can be cloned and
/// stays valid for the whole lifetime of the probe, across enable/disable
/// cycles.
///
/// Events are handed over synchronously: the probe worker blocks until an
/// event is received, so consumers must keep draining the stream while the
/// probe is enabled, including while it is being disabled.
#[derive(Clone)]
pub struct EventStream(Arc<Mutex<Receiver<Event>>>);

impl EventStream {
    fn rx(&self) -> Result<std::sync::MutexGuard<'_, Receiver<Event>>> {
        self.0
            .lock()
            .map_err(|_| anyhow!("Event stream lock poisoned"))
    }

    /// Retrieve the next event, blocking until one is available.
    pub fn recv(&self) -> Result<Event> {
        Ok(self.rx()?.recv()?)
    }

    /// Retrieve the next event, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<EventResult> {
        Ok(match self.rx()?.recv_timeout(timeout) {
            Ok(event) => EventResult::Event(event),
            Err(RecvTimeoutError::Timeout) => EventResult::Timeout,
            Err(e) => return Err(anyhow!(e)),
        })
    }

    /// Retrieve an event if one is ready.
    pub fn try_recv(&self) -> Result<Option<Event>> {
        match self.rx()?.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(e) => Err(anyhow!(e)),
        }
    }
}

/// Mutable part of a probe, guarded by its lock.
#[derive(Default)]
struct ProbeState {
    enabled: bool,
    stopper: Option<Stopper>,
    worker: Option<JoinHandle<()>>,
}

pub struct Probe {
    /// Name of the probe, used for its kernel registration.
    name: String,
    /// Kernel function the probe is attached to.
    syscall: String,
    /// kprobe_events registration line.
    descriptor: String,
    /// Sub-events, by name, and their enable file.
    events: HashMap<String, PathBuf>,
    selector: Selector,
    layout: TracefsLayout,
    surface: Arc<dyn ControlSurface>,
    state: RwLock<ProbeState>,
    /// Sending side of the events channel, cloned into each worker.
    bus: SyncSender<Event>,
    stream: EventStream,
}

impl Probe {
    /// Create a probe named `name` on `syscall`, also listening to the
    /// given sub-events (`<category>/<event>`), using the live tracefs.
    pub fn new<S: AsRef<str>>(name: &str, syscall: &str, sub_events: &[S]) -> Result<Probe> {
        Self::with_surface(
            name,
            syscall,
            sub_events,
            TracefsLayout::default(),
            Arc::new(Tracefs),
        )
    }

    /// Same as `new` with an explicit control files layout and surface.
    pub fn with_surface<S: AsRef<str>>(
        name: &str,
        syscall: &str,
        sub_events: &[S],
        layout: TracefsLayout,
        surface: Arc<dyn ControlSurface>,
    ) -> Result<Probe> {
        let events = map_sub_events(&layout, sub_events)?;
        let selector = Selector::new(name, events.keys().cloned());
        let (bus, rx) = mpsc::sync_channel(0);

        Ok(Probe {
            name: name.to_string(),
            syscall: syscall.to_string(),
            descriptor: descriptor(name, syscall),
            events,
            selector,
            layout,
            surface,
            state: RwLock::new(ProbeState::default()),
            bus,
            stream: EventStream(Arc::new(Mutex::new(rx))),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn syscall(&self) -> &str {
        &self.syscall
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Sub-events, by bare name, and their enable control file.
    pub fn sub_events(&self) -> &HashMap<String, PathBuf> {
        &self.events
    }

    /// Is the probe enabled and its worker running?
    pub fn enabled(&self) -> bool {
        match self.read_state() {
            Ok(state) => state.enabled,
            Err(e) => {
                debug!("{e}, reporting the probe as disabled");
                false
            }
        }
    }

    /// Stream where the probe events are sent.
    pub fn events(&self) -> EventStream {
        self.stream.clone()
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, ProbeState>> {
        self.state
            .read()
            .map_err(|_| anyhow!("Probe {} state lock poisoned", self.name))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, ProbeState>> {
        self.state
            .write()
            .map_err(|_| anyhow!("Probe {} state lock poisoned", self.name))
    }

    /// Sub-events sorted by name, for control files to be accessed in a
    /// stable order.
    fn sorted_events(&self) -> Vec<(&String, &PathBuf)> {
        let mut events: Vec<_> = self.events.iter().collect();
        events.sort();
        events
    }

    fn write(&self, step: String, path: PathBuf, data: &str) -> Result<()> {
        debug!("Probe {}: {step}", self.name);
        self.surface
            .write(&path, data)
            .map_err(|source| ProbeError::Control { step, path, source })?;
        Ok(())
    }

    fn append(&self, step: String, path: PathBuf, data: &str) -> Result<()> {
        debug!("Probe {}: {step}", self.name);
        self.surface
            .append(&path, data)
            .map_err(|source| ProbeError::Control { step, path, source })?;
        Ok(())
    }

    /// Enable the probe and start its worker. Does nothing if the probe is
    /// already enabled.
    pub fn enable(&self) -> Result<()> {
        let mut state = self.write_state()?;
        if state.enabled {
            return Ok(());
        }

        if !available(self.surface.as_ref(), &self.layout) {
            bail!(ProbeError::Unavailable);
        }

        for (event, file) in self.sorted_events() {
            self.write(format!("enable event {event}"), file.clone(), "1")?;
        }

        // Append, writing would drop all other dynamic probes.
        self.append(
            format!("register probe {}", self.name),
            self.layout.kprobe_events(),
            &format!("{}\n", self.descriptor),
        )?;

        self.write(
            format!("enable probe {}", self.name),
            self.layout.kprobe_enable(&self.name),
            "1",
        )?;

        let pipe = self.layout.trace_pipe();
        let reader = LineReader::open(self.surface.as_ref(), &pipe)
            .map_err(|source| ProbeError::Pipe { path: pipe, source })?;

        let stopper = reader.stopper();
        let selector = self.selector.clone();
        let bus = self.bus.clone();
        let worker = thread::Builder::new()
            .name(format!("ktrace-{}", self.name))
            .spawn(move || worker(reader, selector, bus))?;

        state.enabled = true;
        state.stopper = Some(stopper);
        state.worker = Some(worker);

        info!("Probe {} enabled on {}", self.name, self.syscall);
        Ok(())
    }

    /// Turn off the sub-events and the probe and remove its kernel
    /// registration. Stops at the first error. This does not stop the worker
    /// and can be called whatever the probe state is.
    pub fn reset(&self) -> Result<()> {
        for (event, file) in self.sorted_events() {
            self.write(format!("disable event {event}"), file.clone(), "0")?;
        }

        self.write(
            format!("disable probe {}", self.name),
            self.layout.kprobe_enable(&self.name),
            "0",
        )?;

        self.append(
            format!("remove probe {}", self.name),
            self.layout.kprobe_events(),
            &format!("-:{}\n", self.name),
        )
    }

    /// Disable the probe and wait for its worker to stop. Does nothing if the
    /// probe is not enabled. On failure the probe stays enabled.
    ///
    /// The reader thread of the stopped worker can stay blocked reading
    /// `trace_pipe` until the next record comes in. Reads consume data: if the
    /// probe is enabled again in the meantime, the first chunk of records
    /// read by that old thread is lost.
    pub fn disable(&self) -> Result<()> {
        let mut state = self.write_state()?;
        if !state.enabled {
            return Ok(());
        }

        self.reset()?;
        state.enabled = false;

        // The stop message can't be delivered if the pipe was closed, in
        // which case the worker is already exiting.
        if let Some(stopper) = state.stopper.take() {
            if !stopper.stop() {
                debug!("Probe {}: trace pipe already closed", self.name);
            }
        }

        if let Some(worker) = state.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("while joining the {} worker thread", self.name))?;
        }

        info!("Probe {} disabled", self.name);
        Ok(())
    }
}

/// Filters and parses the lines of the trace pipe, until told to stop or the
/// pipe is closed.
fn worker(reader: LineReader, selector: Selector, bus: SyncSender<Event>) {
    for msg in reader.iter() {
        let line = match msg {
            PipeMsg::Stop => break,
            PipeMsg::Line(line) => line,
        };

        match selector.parse(&line) {
            None => (),
            Some(Err(e)) => error!("Error while parsing event: {e}"),
            Some(Ok(event)) => {
                if bus.send(event).is_err() {
                    break;
                }
            }
        }
    }
    debug!("Probe worker exiting");
}
