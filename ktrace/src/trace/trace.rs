use std::{
    io::{self, ErrorKind, Write},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{anyhow, Result};
use log::{debug, info};

use super::print::Printer;
use ktrace::{
    core::{
        kprobe::{EventResult, Probe},
        tracefs::{available, ControlSurface, TracefsLayout},
    },
    helpers::signals::Running,
};

/// How long to wait for an event before checking for termination.
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// How long to wait for an event while the probe is being disabled.
const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// Printing to a closed pipe (e.g. `ktrace trace ... | head`) is a normal
/// way of stopping.
fn ignore_broken_pipe(e: anyhow::Error) -> Result<()> {
    match e.downcast_ref::<io::Error>() {
        Some(io_error) if io_error.kind() == ErrorKind::BrokenPipe => Ok(()),
        _ => Err(e),
    }
}

/// Enable the probe and print its events until told to stop, `count` events
/// were printed or the output is closed. The probe is always disabled before
/// returning once enabled.
pub(crate) fn trace<W: Write>(
    probe: Probe,
    printer: &mut Printer<W>,
    run: &Running,
    count: Option<u64>,
) -> Result<()> {
    let probe = Arc::new(probe);
    let events = probe.events();
    probe.enable()?;

    let mut printed = 0;
    let mut res = Ok(());
    while run.running() && count.map_or(true, |max| printed < max) {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(EventResult::Event(event)) => match printer.print(&event) {
                Ok(()) => printed += 1,
                Err(e) => {
                    res = ignore_broken_pipe(e);
                    break;
                }
            },
            Ok(EventResult::Timeout) => continue,
            Err(e) => {
                res = Err(e);
                break;
            }
        }
    }

    // The worker hands events over synchronously and must be able to make
    // progress until it sees the stop request: keep draining the stream while
    // the probe is being disabled.
    let disabling = {
        let probe = Arc::clone(&probe);
        thread::spawn(move || probe.disable())
    };

    let mut dropped = 0;
    while !disabling.is_finished() {
        if let Ok(EventResult::Event(_)) = events.recv_timeout(DRAIN_INTERVAL) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!("Dropped {dropped} event(s) received while disabling the probe");
    }

    disabling
        .join()
        .map_err(|_| anyhow!("while joining the disabling thread"))??;

    info!("{printed} event(s) printed");
    res.and_then(|_| printer.flush().or_else(ignore_broken_pipe))
}

/// Report if ftrace can be used and the dynamic probes currently registered.
pub(crate) fn status<W: Write>(
    out: &mut W,
    surface: &dyn ControlSurface,
    layout: &TracefsLayout,
) -> Result<()> {
    writeln!(
        out,
        "ftrace: {}",
        match available(surface, layout) {
            true => "available",
            false => "unavailable",
        }
    )?;

    let kprobes = layout.kprobe_events();
    let registered = surface.read(&kprobes).map_err(|e| {
        anyhow!(
            "Could not read the registered probes from {}: {e}",
            kprobes.display()
        )
    })?;

    registered
        .lines()
        .filter(|l| !l.trim().is_empty())
        .try_for_each(|l| writeln!(out, "{l}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use tempfile::TempDir;

    use super::*;
    use crate::trace::print::PrintFormat;
    use ktrace::{
        core::{kprobe::ProbeError, tracefs::Tracefs},
        events::{DisplayFormat, Event},
    };

    const LINES: &str = "\
bash-4241 [000] ...1. 99.000001: test_probe: (__x64_sys_execve+0x0/0x50) arg0=\"/bin/ls\"
bash-4241 [000] ...1. 99.000002: sched_switch: prev_comm=bash prev_pid=4241
ls-4242 [001] d..3. 100.000001: sched_process_exec: filename=/bin/ls pid=4242 old_pid=4242
ls-4242 [001] d..3. 100.000002: test_probe: (__x64_sys_execve+0x0/0x50) arg0=\"/bin/cat\"
";

    /// Builds a fake tracing directory, with the control files the kernel
    /// would provide. It is removed when the returned `TempDir` is dropped.
    fn scratch(status: &str) -> (TempDir, TracefsLayout) {
        let dir = tempfile::tempdir().expect("tempdir");

        let layout = TracefsLayout::new(
            dir.path().join("tracing"),
            dir.path().join("ftrace_enabled"),
        );
        for file in [
            layout.kprobe_enable("test_probe"),
            layout.event_enable("sched/sched_process_exec"),
        ] {
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(&file, "0").unwrap();
        }
        fs::write(layout.kprobe_events(), "").unwrap();
        fs::write(layout.trace_pipe(), LINES).unwrap();
        fs::write(layout.status_file(), status).unwrap();
        (dir, layout)
    }

    fn probe(layout: &TracefsLayout) -> Probe {
        Probe::with_surface(
            "test_probe",
            "__x64_sys_execve",
            &["sched/sched_process_exec"],
            layout.clone(),
            Arc::new(Tracefs),
        )
        .unwrap()
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn trace_count() {
        let (_dir, layout) = scratch("1\n");
        let mut printer = Printer::new(Vec::new(), PrintFormat::Json);

        trace(
            probe(&layout),
            &mut printer,
            &Running::ignore_signals(),
            Some(2),
        )
        .unwrap();

        let output = String::from_utf8(printer.into_inner()).unwrap();
        let events: Vec<Event> = output.lines().map(|l| Event::from_json(l).unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "test_probe");
        assert!(events[0].is_syscall);
        assert_eq!(events[0].args["arg0"], "/bin/ls");
        assert_eq!(events[1].name, "sched_process_exec");
        assert_eq!(events[1].pid, 4242);

        // Registered, then removed.
        assert_eq!(
            read(&layout.kprobe_events()),
            format!("{}\n-:test_probe\n", probe(&layout).descriptor())
        );
        assert_eq!(read(&layout.kprobe_enable("test_probe")), "0");
        assert_eq!(read(&layout.event_enable("sched/sched_process_exec")), "0");
    }

    #[test]
    fn trace_terminated() {
        let (_dir, layout) = scratch("1\n");
        let mut printer = Printer::new(Vec::new(), PrintFormat::Text(DisplayFormat::new()));
        let run = Running::ignore_signals();
        run.terminate();

        trace(probe(&layout), &mut printer, &run, None).unwrap();

        assert!(printer.into_inner().is_empty());
        assert!(read(&layout.kprobe_events()).ends_with("-:test_probe\n"));
    }

    #[test]
    fn trace_unavailable() {
        let (_dir, layout) = scratch("0\n");
        let mut printer = Printer::new(Vec::new(), PrintFormat::Json);

        let err = trace(
            probe(&layout),
            &mut printer,
            &Running::ignore_signals(),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::Unavailable)
        ));
        assert!(read(&layout.kprobe_events()).is_empty());
    }

    #[test]
    fn status_report() {
        let (_dir, layout) = scratch("1\n");
        fs::write(
            layout.kprobe_events(),
            "p:kprobes/a do_a\n\np:kprobes/b do_b\n",
        )
        .unwrap();

        let mut out = Vec::new();
        status(&mut out, &Tracefs, &layout).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "ftrace: available\np:kprobes/a do_a\np:kprobes/b do_b\n"
        );

        fs::write(layout.status_file(), "0\n").unwrap();
        fs::remove_file(layout.kprobe_events()).unwrap();
        let mut out = Vec::new();
        assert!(status(&mut out, &Tracefs, &layout).is_err());
        assert_eq!(String::from_utf8(out).unwrap(), "ftrace: unavailable\n");
    }
}
