//! CLI flag schema for the scenario runner.

use clap::Parser;
use std::path::PathBuf;
use echotrail::config::AppConfig;

#[derive(Debug, Parser, Clone)]
#[command(about = "Replay a location track against geotagged audio memories", author, version)]
pub(crate) struct CliConfig {
    #[command(flatten)]
    pub(crate) app: AppConfig,

    /// Scenario file (.yaml/.yml or .json) with memories, clips, and a track
    #[arg(long = "scenario")]
    pub(crate) scenario: Option<PathBuf>,

    /// Print the final scheduler snapshot as JSON after the timeline
    #[arg(long = "json", default_value_t = false)]
    pub(crate) json: bool,

    /// Keep playing queued clips after the last track sample
    #[arg(long = "drain", default_value_t = false)]
    pub(crate) drain: bool,

    /// Print resolved scheduler settings and exit
    #[arg(long = "print-config", default_value_t = false)]
    pub(crate) print_config: bool,
}
