//! Command-line interface for `topeupdated`.
//!
//! A single long-running process with no subcommands, so this is a flatter
//! surface than the daemon's `Cli`: no `Commands` enum, since there is only
//! one mode of operation. `--log-level` is a `clap::ValueEnum` rather than
//! the daemon's hand-rolled numeric/named `FromStr` parser, since this
//! binary has no operator-facing reason to accept `0`-`5` shorthand.

use clap::{Parser, ValueEnum};

/// Logging verbosity accepted by `--log-level`, named after the `tracing`
/// levels this binary actually emits.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevelArg {
    /// String representation suitable for an `EnvFilter` directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevelArg::Off => "off",
            LogLevelArg::Error => "error",
            LogLevelArg::Warn => "warn",
            LogLevelArg::Info => "info",
            LogLevelArg::Debug => "debug",
            LogLevelArg::Trace => "trace",
        }
    }
}

/// Command-line interface for the OTA update agent.
#[derive(Parser)]
#[command(name = "topeupdated", version, author)]
#[command(about = "On-device OTA update agent", long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, value_name = "PATH", default_value = "topeupdate.yaml")]
    pub config: String,

    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevelArg>,

    /// Override the configured install root.
    #[arg(long, value_name = "PATH")]
    pub install_root: Option<String>,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
