use std::io::Write;

use anyhow::Result;

use ktrace::events::*;

/// Select the format to follow when printing events with `Printer`.
pub(crate) enum PrintFormat {
    /// Text(format): display the events in a text representation following the
    /// rules defined in `format` (see `DisplayFormat`).
    Text(DisplayFormat),
    /// Json: display the event as JSON.
    Json,
}

/// Handles events individually and writes them to a `Write`.
pub(crate) struct Printer<W: Write> {
    writer: W,
    format: PrintFormat,
}

impl<W: Write> Printer<W> {
    pub(crate) fn new(writer: W, format: PrintFormat) -> Self {
        Self { writer, format }
    }

    /// Format & print a single event.
    pub(crate) fn print(&mut self, e: &Event) -> Result<()> {
        match &self.format {
            PrintFormat::Text(format) => {
                let event = format!("{}", e.display(format));
                if !event.is_empty() {
                    self.writer.write_all(event.as_bytes())?;
                    self.writer
                        .write_all(if format.multiline { b"\n\n" } else { b"\n" })?;
                }
            }
            PrintFormat::Json => {
                let mut event = serde_json::to_vec(&e.to_json()?)?;
                event.push(b'\n');
                self.writer.write_all(&event)?;
            }
        }

        Ok(())
    }

    /// Flush underlying writers.
    pub(crate) fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.writer
    }
}
