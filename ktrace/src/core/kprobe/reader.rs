//! # Line reader
//!
//! Turns a blocking, line oriented stream (e.g. `trace_pipe`) into a channel
//! of lines fed by a dedicated thread. The channel is closed when the stream
//! ends, which is the only end-of-data signal.

use std::{
    io::{self, BufRead},
    path::Path,
    sync::{
        mpsc::{self, Receiver, SyncSender},
        Arc, Weak,
    },
    thread,
};

use log::debug;

use crate::core::tracefs::ControlSurface;

/// Messages going through the line channel.
#[derive(Debug, PartialEq)]
pub enum PipeMsg {
    /// A line read from the stream, without its line terminator.
    Line(String),
    /// Asks the consumer to stop, see `Stopper`.
    Stop,
}

/// Reading end of an open stream.
pub struct LineReader {
    rx: Receiver<PipeMsg>,
    // The producer thread owns the only strong reference to the sender, so
    // the channel closes as soon as it exits.
    tx: Weak<SyncSender<PipeMsg>>,
}

impl LineReader {
    /// Open a stream through the control surface and start reading it.
    pub fn open(surface: &dyn ControlSurface, path: &Path) -> io::Result<LineReader> {
        let stream = surface.open_stream(path)?;
        Self::from_stream(stream, &path.display().to_string())
    }

    /// Start reading lines from an already opened stream.
    pub fn from_stream<R>(mut stream: R, name: &str) -> io::Result<LineReader>
    where
        R: BufRead + Send + 'static,
    {
        // Rendezvous channel: the producer blocks until each line is taken.
        let (tx, rx) = mpsc::sync_channel(0);
        let tx = Arc::new(tx);
        let weak = Arc::downgrade(&tx);

        let name = name.to_string();
        thread::Builder::new()
            .name("ktrace-reader".to_string())
            .spawn(move || {
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match stream.read_until(b'\n', &mut buf) {
                        Ok(0) => {
                            debug!("Reached the end of {name}");
                            break;
                        }
                        Ok(_) => (),
                        Err(e) => {
                            debug!("Stopped reading {name}: {e}");
                            break;
                        }
                    }

                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }

                    // The consumer is gone, nobody cares about what's next.
                    if tx
                        .send(PipeMsg::Line(String::from_utf8_lossy(&buf).into_owned()))
                        .is_err()
                    {
                        break;
                    }
                }
            })?;

        Ok(LineReader { rx, tx: weak })
    }

    /// Handle used to interrupt the consumer of this reader.
    pub fn stopper(&self) -> Stopper {
        Stopper(self.tx.clone())
    }

    /// Blocks until the next message. Returns None once the channel is
    /// closed.
    pub fn recv(&self) -> Option<PipeMsg> {
        self.rx.recv().ok()
    }

    /// Blocking iterator over the messages, ending when the channel closes.
    pub fn iter(&self) -> impl Iterator<Item = PipeMsg> + '_ {
        self.rx.iter()
    }
}

/// Injects a `PipeMsg::Stop` in the line channel of a reader.
#[derive(Clone)]
pub struct Stopper(Weak<SyncSender<PipeMsg>>);

impl Stopper {
    /// Send a stop message, blocking until the consumer receives it. Returns
    /// false if the channel was already closed or the consumer is gone.
    pub fn stop(&self) -> bool {
        match self.0.upgrade() {
            Some(tx) => tx.send(PipeMsg::Stop).is_ok(),
            None => false,
        }
    }
}
