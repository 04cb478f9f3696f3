//! Scenario runner binary: replays a location track against a memory set.

mod cli;
mod runner;
mod scenario;

use anyhow::{bail, Context, Result};
use clap::Parser;

use echotrail::telemetry::init_tracing;

use crate::cli::CliConfig;
use crate::scenario::Scenario;

fn main() -> Result<()> {
    let cli = CliConfig::parse();
    let file = cli.app.load_file()?;
    let settings = cli.app.resolve(&file)?;
    init_tracing(cli.app.logging_enabled(&file));

    if cli.print_config {
        println!(
            "{}",
            serde_json::to_string_pretty(&settings).context("failed to encode settings")?
        );
        return Ok(());
    }

    let Some(path) = cli.scenario.as_deref() else {
        bail!("no scenario given; pass --scenario <file>");
    };
    let scenario = Scenario::load(path)?;
    let report = runner::run(&scenario, settings, cli.drain);

    for line in &report.lines {
        println!("{line}");
    }
    println!("{}", report.summary());
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report.snapshot).context("failed to encode snapshot")?
        );
    }
    Ok(())
}
