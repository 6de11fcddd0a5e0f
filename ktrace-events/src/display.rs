use std::fmt;

/// Controls how the timestamp should be displayed in the events.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum TimeFormat {
    /// Kernel trace clock, as `<secs>.<usecs>`.
    #[default]
    TraceClock,
    /// Raw nanoseconds.
    Nanoseconds,
}

/// Controls how an event is formatted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisplayFormat {
    /// Can the formatting logic use more than a single line?
    pub multiline: bool,
    /// How the time is formatted.
    pub time_format: TimeFormat,
}

impl DisplayFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure multi-line output.
    pub fn multiline(mut self, enabled: bool) -> Self {
        self.multiline = enabled;
        self
    }

    /// Configure how the time will be formatted.
    pub fn time_format(mut self, format: TimeFormat) -> Self {
        self.time_format = format;
        self
    }
}

/// Formatting of an event with a given `DisplayFormat`.
pub trait EventDisplay<'a>: EventFmt {
    fn display(&'a self, format: &'a DisplayFormat) -> Box<dyn fmt::Display + 'a>;
}

/// Implemented by events; `EventDisplay` comes with it.
pub trait EventFmt {
    fn event_fmt(&self, f: &mut fmt::Formatter, format: &DisplayFormat) -> fmt::Result;
}

impl<'a, T> EventDisplay<'a> for T
where
    T: EventFmt,
{
    fn display(&'a self, format: &'a DisplayFormat) -> Box<dyn fmt::Display + 'a> {
        struct Formatted<'a, U> {
            event: &'a U,
            format: &'a DisplayFormat,
        }
        impl<U: EventFmt> fmt::Display for Formatted<'_, U> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                self.event.event_fmt(f, self.format)
            }
        }
        Box::new(Formatted {
            event: self,
            format,
        })
    }
}

/// Writes a delimiter before every item but the first one.
pub(crate) struct DelimWriter {
    delim: char,
    first: bool,
}

impl DelimWriter {
    pub(crate) fn new(delim: char) -> Self {
        DelimWriter { delim, first: true }
    }

    pub(crate) fn write(&mut self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.first {
            true => self.first = false,
            false => write!(f, "{}", self.delim)?,
        }
        Ok(())
    }
}
