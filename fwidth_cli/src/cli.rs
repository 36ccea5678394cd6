//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "fwidth", version, about = "Filament width sensor CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/fwidth.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict header), used when the config has no [calibration]
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log as JSON lines and print machine-readable results
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the compensator against the configured sensors until Ctrl-C or --duration-ms
    Run {
        /// Stop after this many milliseconds
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
        /// Host command to send once the loop is up (repeatable), e.g. DISABLE_FILAMENT_WIDTH_SENSOR
        #[arg(long = "send", value_name = "COMMAND")]
        send: Vec<String>,
    },
    /// Execute one host command against a freshly built sensor
    Command {
        /// Command name (case-insensitive), e.g. QUERY_FILAMENT_WIDTH
        name: String,
        /// Raw ADC reading to feed before the command
        #[arg(long, value_name = "RAW")]
        reading: Option<f32>,
    },
    /// Fit a linear calibration from a `reading,diameter` CSV and print the [calibration] block
    Calibrate {
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
    },
    /// Quick configuration and device check
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
