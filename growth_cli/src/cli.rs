//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "growth-optimizer",
    version,
    about = "Turbidostat growth optimizer for photobioreactors"
)]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/growth_config.toml")]
    pub config: PathBuf,

    /// Output JSON lines instead of text (logs, journal, errors)
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the optimizer against simulated cultures, one per configured unit
    Simulate {
        /// Experiment hours to simulate (overrides simulation.hours)
        #[arg(long, value_name = "H")]
        hours: Option<f64>,
        /// Directory where unit contexts are persisted as JSON
        #[arg(long, value_name = "DIR")]
        state_dir: Option<PathBuf>,
        /// Continue from the contexts found in --state-dir
        #[arg(long, action = ArgAction::SetTrue, requires = "state_dir")]
        resume: bool,
    },
    /// Feed a recorded OD trace (CSV `time_s,od`) through one unit
    Replay {
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
    },
    /// Validate the configuration and build the optimizer
    CheckConfig,
    /// Health check for operational monitoring
    Health,
}
