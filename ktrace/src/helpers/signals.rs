/// # Signals
///
/// Provides a simple way for both registering signal handlers or
/// simply notify terminations to the threads.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use anyhow::Result;
use log::info;
use signal_hook::iterator::Signals;

#[derive(Clone)]
pub struct Running {
    condition: Arc<AtomicBool>,
}

impl Running {
    /// Create a new Running instance, which stops upon receiving one of the
    /// termination signals (e.g. SIGTERM).
    pub fn new() -> Result<Running> {
        let mut sigs = Signals::new(signal_hook::consts::TERM_SIGNALS)?;

        let run = Self::ignore_signals();
        let condition = Arc::clone(&run.condition);

        thread::spawn(move || {
            sigs.wait();
            condition.store(true, Ordering::Relaxed);
            info!("Received signal, terminating...");
        });

        Ok(run)
    }

    /// Same as `new()` but without handling termination signals. Termination
    /// *must* be manually handled here.
    pub fn ignore_signals() -> Running {
        Self {
            condition: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn running(&self) -> bool {
        !self.condition.load(Ordering::Relaxed)
    }

    pub fn terminate(&self) {
        self.condition.store(true, Ordering::Relaxed);
    }
}
