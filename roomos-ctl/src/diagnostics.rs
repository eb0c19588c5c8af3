//! Command Line and Logging
//!
//! Parses the command line and sets up `tracing` output for roomos-ctl.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// roomos-ctl command-line interface
#[derive(Parser, Debug)]
#[command(name = "roomos-ctl")]
#[command(about = "Connect to Cisco RoomOS devices over the xAPI", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    /// Enable JSON structured logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Show timestamps in logs
    #[arg(long, default_value_t = true, action = ArgAction::Set, global = true)]
    pub timestamps: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Device host, used instead of a configured device
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Login user for --host, or override for configured devices
    #[arg(short, long, global = true)]
    pub username: Option<String>,

    /// Login password
    #[arg(long, env = "ROOMOS_PASSWORD", hide_env_values = true, global = true, default_value = "")]
    pub password: String,

    /// Accept self-signed device certificates
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Which device a single-device command talks to
#[derive(Args, Debug, Clone, Default)]
pub struct Target {
    /// Configured device id (defaults to --host, then the only configured device)
    #[arg(short, long)]
    pub device: Option<String>,
}

/// roomos-ctl commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect configured devices and report status changes until Ctrl-C
    Watch {
        /// Only these device ids (default: all)
        #[arg(short, long)]
        device: Vec<String>,

        /// Print each status change as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Print device identity as JSON
    Info {
        #[command(flatten)]
        target: Target,
    },

    /// Probe a device
    Ping {
        #[command(flatten)]
        target: Target,

        /// Number of probes
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Seconds between probes
        #[arg(short, long, default_value = "1")]
        interval: u64,
    },

    /// Read a status or configuration path (e.g. Status/SystemUnit/Uptime)
    Get {
        #[command(flatten)]
        target: Target,

        /// xAPI path
        path: String,
    },

    /// Write a configuration leaf (e.g. SystemUnit/Name "Boardroom")
    Set {
        #[command(flatten)]
        target: Target,

        /// Configuration path, with or without the Config root
        path: String,

        /// New value; parsed as JSON when possible, otherwise sent as text
        value: String,
    },

    /// Invoke a command (e.g. Audio/Volume/Set Level=40)
    Command {
        #[command(flatten)]
        target: Target,

        /// Command path, with or without the Command root
        path: String,

        /// Arguments as Key=Value
        args: Vec<String>,
    },
}

/// Initialize logging based on CLI configuration
pub fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli.log_level.parse::<Level>().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            cli.log_level
        )
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.as_str()))
        .context("Failed to create log filter")?;

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match (cli.json_logs, cli.timestamps) {
        (true, true) => subscriber.json().init(),
        (true, false) => subscriber.without_time().json().init(),
        (false, true) => subscriber.init(),
        (false, false) => subscriber.without_time().init(),
    }

    debug!(
        "Logging initialized: level={}, json={}, timestamps={}",
        log_level, cli.json_logs, cli.timestamps
    );

    Ok(())
}
