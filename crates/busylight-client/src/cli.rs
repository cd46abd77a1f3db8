//! Command-line interface definition.

use std::path::PathBuf;
use std::time::Duration;

use busylight_core::Event;
use clap::{Parser, Subcommand};

use crate::error::{ClientError, ClientResult};

/// busylight - show calendar and call availability on a USB light
#[derive(Debug, Parser)]
#[command(name = "busylight")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "BUSYLIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Path to the daemon control socket
    #[arg(long, env = "BUSYLIGHT_SOCKET")]
    pub socket_path: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, default_value = "5")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Returns the configuration file to use.
    pub fn config_path(&self) -> ClientResult<PathBuf> {
        self.config
            .clone()
            .or_else(busylight_server::default_config_path)
            .ok_or_else(|| ClientError::Config("cannot determine the config directory".into()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground
    Daemon,

    /// Send an event to the running daemon
    Send {
        /// One of: zoom-muted, zoom-open-mic, zoom-ended, toggle-urgent,
        /// toggle-low-priority, toggle-active, refresh, terminate
        event: Event,
    },

    /// Show what the light is showing and why
    Status {
        /// Print the raw status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the daemon is answering
    Ping,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the parsed configuration, defaults included
    Dump,

    /// Validate configuration and credentials
    Validate,

    /// Show configuration file path
    Path,
}
