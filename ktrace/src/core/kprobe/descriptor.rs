//! # Descriptor
//!
//! Builds what the kernel needs to register a probe and to toggle its
//! sub-events.

use std::{collections::HashMap, path::PathBuf};

use anyhow::Result;

use super::probe::ProbeError;
use crate::core::tracefs::TracefsLayout;

/// Number of arguments fetched by a probe.
pub const MAX_ARGUMENTS: usize = 16;

/// Offsets, relative to `%si`, of the arguments fetched by a probe. Syscall
/// wrappers get the user registers through a pointer in `%si` and arguments
/// are read from it every 8 bytes. This is x86-64 only and must stay in sync
/// with `ARG_REGISTER`.
pub const ARG_OFFSETS: [usize; MAX_ARGUMENTS] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 72, 80, 88, 96, 104, 112, 120,
];

/// Register holding the base address arguments are fetched from.
pub const ARG_REGISTER: &str = "%si";

/// Build the kprobe_events registration line of a probe. Every argument is
/// fetched as a string.
pub fn descriptor(name: &str, syscall: &str) -> String {
    let mut desc = format!("p:kprobes/{name} {syscall}");
    ARG_OFFSETS.iter().enumerate().for_each(|(i, off)| {
        desc.push_str(&format!(" arg{i}=+0(+{off}({ARG_REGISTER})):string"));
    });
    desc
}

/// Check a sub-event is given as `<category>/<event>` or `<event>`, so its
/// enable file stays under the `events` directory.
pub fn check_sub_event(event: &str) -> Result<(), ProbeError> {
    let mut parts = event.split('/');
    let valid = parts.clone().count() <= 2
        && parts.all(|part| !part.is_empty() && part != "." && part != "..");

    match valid {
        true => Ok(()),
        false => Err(ProbeError::InvalidEvent(event.to_string())),
    }
}

/// Map sub-events to their enable file. Sub-events are given as
/// `<category>/<event>` (or `<event>`) and are keyed by their bare event
/// name, which is also the token used to match their records.
pub fn map_sub_events<S>(
    layout: &TracefsLayout,
    sub_events: &[S],
) -> Result<HashMap<String, PathBuf>>
where
    S: AsRef<str>,
{
    sub_events
        .iter()
        .map(|event| -> Result<(String, PathBuf)> {
            let event = event.as_ref();
            check_sub_event(event)?;

            let name = match event.split_once('/') {
                Some((_, name)) => name,
                None => event,
            };
            Ok((name.to_string(), layout.event_enable(event)))
        })
        .collect()
}
