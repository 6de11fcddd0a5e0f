use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

mod cli;
mod trace;

use crate::cli::{KtraceCli, SubCommandRunner};
use ktrace::helpers::logger::Logger;

fn main() -> Result<()> {
    let mut cli = KtraceCli::parse();

    let level: LevelFilter = cli.main_config.log_level.parse()?;
    let _logger = Logger::init(level)?;

    cli.subcommand.runner().run(&cli.main_config)
}
