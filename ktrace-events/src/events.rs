//! Internal representation of events. Events can be marshaled to JSON, which
//! should look like:
//!
//! {
//!     "pid": 1234,
//!     "name": "sched_process_exec",
//!     "is_syscall": false,
//!     "comm": "bash",
//!     "cpu": 2,
//!     "timestamp": 5130104573000,
//!     "args": {
//!         "filename": "/bin/ls",
//!         "old_pid": "1234",
//!         "pid": "1234"
//!     }
//! }

use std::{collections::BTreeMap, fmt};

use anyhow::Result;

use crate::{display::*, trace::TraceRecord};

/// Full event, as delivered to consumers.
#[derive(Default, Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Event {
    /// Id of the process which generated the event.
    pub pid: i32,
    /// Name of the kernel event: the probe name for syscall events, the
    /// sub-event name otherwise.
    pub name: String,
    /// Was the event emitted by the syscall probe itself?
    pub is_syscall: bool,
    /// Name of the task.
    pub comm: String,
    /// CPU the event was emitted on.
    pub cpu: u32,
    /// Trace clock timestamp, in nanoseconds.
    pub timestamp: u64,
    /// Event arguments.
    pub args: BTreeMap<String, String>,
}

impl Event {
    /// Build an event out of a parsed trace record. The event name is not
    /// taken from the record as the caller knows what it selected the record
    /// for.
    pub fn from_record(record: TraceRecord, name: &str, is_syscall: bool) -> Event {
        Event {
            pid: record.pid,
            name: name.to_string(),
            is_syscall,
            comm: record.comm,
            cpu: record.cpu,
            timestamp: record.timestamp,
            args: record.args,
        }
    }

    /// Create an Event from a json string.
    pub fn from_json(line: &str) -> Result<Event> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl EventFmt for Event {
    fn event_fmt(&self, f: &mut fmt::Formatter, format: &DisplayFormat) -> fmt::Result {
        match format.time_format {
            TimeFormat::TraceClock => write!(
                f,
                "{}.{:06}",
                self.timestamp / 1_000_000_000,
                (self.timestamp % 1_000_000_000) / 1000
            )?,
            TimeFormat::Nanoseconds => write!(f, "{}", self.timestamp)?,
        }

        write!(
            f,
            " ({}) [{}] {} [{}] {}",
            self.cpu,
            self.comm,
            self.pid,
            if self.is_syscall { "k" } else { "tp" },
            self.name,
        )?;

        if self.args.is_empty() {
            return Ok(());
        }

        let mut sep = DelimWriter::new(if format.multiline { '\n' } else { ' ' });
        write!(f, "{}", if format.multiline { '\n' } else { ' ' })?;
        self.args.iter().try_for_each(|(key, val)| {
            sep.write(f)?;
            if format.multiline {
                write!(f, "  ")?;
            }
            write!(f, "{key}={val}")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        let record = TraceRecord::from_line(
            "bash-1234 [002] d..3. 5130.104573: sched_process_exec: filename=/bin/ls pid=1234",
        )
        .unwrap();
        Event::from_record(record, "sched_process_exec", false)
    }

    #[test]
    fn from_record() {
        let event = event();

        assert_eq!(event.pid, 1234);
        assert_eq!(event.name, "sched_process_exec");
        assert!(!event.is_syscall);
        assert_eq!(event.args["filename"], "/bin/ls");
    }

    #[test]
    fn display() {
        let event = event();

        assert_eq!(
            format!("{}", event.display(&DisplayFormat::new())),
            "5130.104573 (2) [bash] 1234 [tp] sched_process_exec filename=/bin/ls pid=1234"
        );
        assert_eq!(
            format!(
                "{}",
                event.display(
                    &DisplayFormat::new()
                        .multiline(true)
                        .time_format(TimeFormat::Nanoseconds)
                )
            ),
            "5130104573000 (2) [bash] 1234 [tp] sched_process_exec\n  filename=/bin/ls\n  pid=1234"
        );
    }

    #[test]
    fn json() {
        let event = event();
        let json = event.to_json().unwrap();

        assert_eq!(json["pid"], 1234);
        assert_eq!(json["is_syscall"], false);
        assert_eq!(json["args"]["filename"], "/bin/ls");
        assert_eq!(Event::from_json(&json.to_string()).unwrap(), event);
    }
}
