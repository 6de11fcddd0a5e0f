//! Command line arguments of the trace related subcommands.

use std::{io::stdout, sync::Arc};

use anyhow::Result;
use clap::Args;
use log::warn;
use nix::unistd::Uid;

use super::{
    print::{PrintFormat, Printer},
    trace::{status, trace},
};
use crate::cli::*;
use ktrace::{
    core::{
        kprobe::{check_sub_event, Probe},
        tracefs::{Tracefs, TracefsLayout},
    },
    events::{DisplayFormat, TimeFormat},
    helpers::signals::Running,
};

/// Kprobe event names follow the C identifier rules.
fn parse_probe_name(name: &str) -> Result<String, String> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    match valid {
        true => Ok(name.to_string()),
        false => Err(format!(
            "invalid probe name '{name}' (expected letters, digits and underscores, not starting with a digit)"
        )),
    }
}

fn parse_sub_event(event: &str) -> Result<String, String> {
    check_sub_event(event)
        .map(|_| event.to_string())
        .map_err(|e| e.to_string())
}

/// Definition of the probe to work with.
#[derive(Args, Debug)]
pub(crate) struct ProbeArgs {
    #[arg(
        long,
        default_value = "ktrace",
        value_parser = parse_probe_name,
        help = "Name of the probe, as registered in the kernel"
    )]
    pub(crate) name: String,
    #[arg(help = "Kernel function to attach the probe to (e.g. __x64_sys_execve)")]
    pub(crate) syscall: String,
    #[arg(
        short,
        long = "event",
        value_delimiter = ',',
        value_parser = parse_sub_event,
        help = "Comma separated list of tracepoints to enable alongside the probe, as <category>/<event> (e.g. sched/sched_process_exec)"
    )]
    pub(crate) events: Vec<String>,
}

impl ProbeArgs {
    /// Build the probe, on the live tracefs.
    pub(crate) fn probe(&self, layout: TracefsLayout) -> Result<Probe> {
        Probe::with_surface(
            &self.name,
            &self.syscall,
            self.events.as_slice(),
            layout,
            Arc::new(Tracefs),
        )
    }
}

#[derive(Args, Debug)]
pub(crate) struct Trace {
    #[command(flatten)]
    pub(crate) probe: ProbeArgs,
    #[arg(long, help = "Format used when printing an event")]
    #[clap(value_enum, default_value_t=CliDisplayFormat::SingleLine)]
    pub(crate) format: CliDisplayFormat,
    #[arg(long, help = "Print timestamps as raw nanoseconds")]
    pub(crate) nanoseconds: bool,
    #[arg(
        long,
        help = "Remove a stale registration of the probe before enabling it"
    )]
    pub(crate) reset: bool,
    #[arg(short, long, help = "Stop after printing this number of events")]
    pub(crate) count: Option<u64>,
}

impl Trace {
    fn print_format(&self) -> PrintFormat {
        let time_format = match self.nanoseconds {
            true => TimeFormat::Nanoseconds,
            false => TimeFormat::TraceClock,
        };

        match self.format {
            CliDisplayFormat::Json => PrintFormat::Json,
            format => PrintFormat::Text(
                DisplayFormat::new()
                    .multiline(format == CliDisplayFormat::MultiLine)
                    .time_format(time_format),
            ),
        }
    }
}

impl SubCommandRunner for Trace {
    fn run(&mut self, main_config: &MainConfig) -> Result<()> {
        if !Uid::effective().is_root() {
            warn!("Not running as root, accessing the tracing control files will likely fail");
        }

        let probe = self.probe.probe(main_config.layout())?;
        if self.reset {
            if let Err(e) = probe.reset() {
                warn!("Could not reset probe {}: {e}", probe.name());
            }
        }

        // Create running instance that will handle signal termination.
        let run = Running::new()?;
        let mut printer = Printer::new(stdout(), self.print_format());

        trace(probe, &mut printer, &run, self.count)
    }
}

#[derive(Args, Debug)]
pub(crate) struct Reset {
    #[command(flatten)]
    pub(crate) probe: ProbeArgs,
}

impl SubCommandRunner for Reset {
    fn run(&mut self, main_config: &MainConfig) -> Result<()> {
        self.probe.probe(main_config.layout())?.reset()
    }
}

#[derive(Args, Debug)]
pub(crate) struct Status {}

impl SubCommandRunner for Status {
    fn run(&mut self, main_config: &MainConfig) -> Result<()> {
        status(&mut stdout(), &Tracefs, &main_config.layout())
    }
}
