use std::path::PathBuf;

use clap::Parser;

/// Replication monitor CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "replication-monitor",
    version,
    about = "Checks MySQL replica lag and alerts by email or SMS when it is too high"
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, env = "REPLICATION_MONITOR_CONFIG", default_value = "config.yml")]
    pub config: PathBuf,

    /// Print the batch summary as JSON on stdout when the run finishes
    #[arg(long)]
    pub json: bool,
}
