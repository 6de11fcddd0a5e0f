use std::path::PathBuf;

use anyhow::Result;
use clap::{builder::PossibleValuesParser, Args, Parser, Subcommand, ValueEnum};

use crate::trace::{Reset, Status, Trace};
use ktrace::core::tracefs::{TracefsLayout, STATUS_FILE, TRACING_DIR};

/// SubCommandRunner defines the common interface to run SubCommands.
pub(crate) trait SubCommandRunner {
    /// Run the subcommand with the global configuration.
    fn run(&mut self, main_config: &MainConfig) -> Result<()>;
}

/// Options shared by all subcommands.
#[derive(Args, Debug, Default)]
pub(crate) struct MainConfig {
    #[arg(
        long,
        value_parser=PossibleValuesParser::new(["error", "warn", "info", "debug", "trace"]),
        default_value = "info",
        help = "Log level",
    )]
    pub(crate) log_level: String,
    #[arg(
        long,
        default_value = TRACING_DIR,
        help = "Path to the tracing directory of tracefs"
    )]
    pub(crate) tracing_dir: PathBuf,
    #[arg(
        long,
        default_value = STATUS_FILE,
        help = "File reporting if ftrace is enabled on the system"
    )]
    pub(crate) status_file: PathBuf,
}

impl MainConfig {
    /// Control files layout matching the configuration.
    pub(crate) fn layout(&self) -> TracefsLayout {
        TracefsLayout::new(&self.tracing_dir, &self.status_file)
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum SubCommands {
    /// Trace a kernel function and print its events.
    Trace(Trace),
    /// Turn off a probe and its tracepoints and remove its registration.
    Reset(Reset),
    /// Report if ftrace is available and the registered dynamic probes.
    Status(Status),
}

impl SubCommands {
    pub(crate) fn runner(&mut self) -> &mut dyn SubCommandRunner {
        match self {
            SubCommands::Trace(cmd) => cmd,
            SubCommands::Reset(cmd) => cmd,
            SubCommands::Status(cmd) => cmd,
        }
    }
}

/// Trace kernel functions and tracepoints
///
/// ktrace registers a dynamic probe (kprobe) on a kernel function, optionally
/// enables a set of tracepoints alongside it, and prints the resulting events.
#[derive(Parser, Debug)]
#[command(name = "ktrace", version, disable_help_subcommand = true)]
pub(crate) struct KtraceCli {
    #[command(flatten)]
    pub(crate) main_config: MainConfig,
    #[command(subcommand)]
    pub(crate) subcommand: SubCommands,
}

/// Type of the "format" argument.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub(crate) enum CliDisplayFormat {
    #[default]
    SingleLine,
    MultiLine,
    Json,
}
