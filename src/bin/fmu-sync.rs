//! FMU Sync CLI Binary

use anyhow::Context;
use clap::Parser;
use fmu_sync::logging::init_logging;
use fmu_sync::tooling::{Cli, CliContext};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = CliContext::new(&cli).context("Error initializing workspace")?;
    let logging = context.logging_config(&cli)?;
    init_logging(Some(&logging)).context("Error initializing logging")?;

    let output = context.execute(&cli.command)?;
    println!("{}", output);
    Ok(())
}
