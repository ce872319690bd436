//! Clap derive structures for the fleetwatch command line.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Watch a fleet of devices and stream their telemetry to dashboards.
#[derive(Debug, Parser)]
#[command(name = "fleetwatch", version, about, propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the configuration file
    #[arg(long, short = 'c', env = "FLEETWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the fleet and serve dashboard clients until interrupted
    Run(RunArgs),

    /// Inspect the configuration
    Config(ConfigArgs),
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Websocket listen address (overrides server.listen)
    #[arg(long, short = 'l')]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Validate the configuration and summarize it
    Check,

    /// Print the default configuration file location
    Path,
}
