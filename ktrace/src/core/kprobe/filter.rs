use crate::events::{Event, ParseError, TraceRecord};

/// What a record was selected for.
#[derive(Debug, PartialEq)]
pub enum Selection<'a> {
    /// The probe's own syscall event.
    Syscall(&'a str),
    /// One of the probe's sub-events.
    SubEvent(&'a str),
}

/// Decides which trace records belong to a probe and turns them into events.
///
/// Matching is done on substrings of the raw line and not on the parsed
/// event name, which tolerates format differences between kernels but can
/// select lines mentioning a name by coincidence.
#[derive(Clone, Debug)]
pub struct Selector {
    probe: String,
    sub_events: Vec<String>,
}

impl Selector {
    pub fn new<I, S>(probe: &str, sub_events: I) -> Selector
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sub_events: Vec<String> = sub_events.into_iter().map(Into::into).collect();
        // Be deterministic when a line matches multiple sub-events.
        sub_events.sort();
        sub_events.dedup();

        Selector {
            probe: probe.to_string(),
            sub_events,
        }
    }

    pub fn select(&self, line: &str) -> Option<Selection<'_>> {
        if line.contains(self.probe.as_str()) {
            return Some(Selection::Syscall(&self.probe));
        }

        self.sub_events
            .iter()
            .find(|event| line.contains(event.as_str()))
            .map(|event| Selection::SubEvent(event))
    }

    /// Select and parse a line. Returns None if the line isn't relevant.
    pub fn parse(&self, line: &str) -> Option<Result<Event, ParseError>> {
        let (name, is_syscall) = match self.select(line)? {
            Selection::Syscall(name) => (name, true),
            Selection::SubEvent(name) => (name, false),
        };

        Some(TraceRecord::from_line(line).map(|record| Event::from_record(record, name, is_syscall)))
    }
}
