//! busylight CLI entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use busylight_core::{TracingConfig, init_tracing};
use clap::Parser;
use tracing::debug;

use busylight_client::cli::{Cli, Command, ConfigAction};
use busylight_client::commands;
use busylight_client::error::ClientResult;
use busylight_client::socket::SocketClient;
use busylight_server::{DaemonConfig, default_socket_path};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The daemon installs its own subscriber once its log file is known.
    if !matches!(cli.command, Command::Daemon) {
        let tracing = if cli.debug {
            TracingConfig::cli_debug()
        } else {
            TracingConfig::default()
        };
        if let Err(e) = init_tracing(tracing) {
            eprintln!("warning: {e}");
        }
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    match &cli.command {
        Command::Daemon => commands::daemon::run(&cli.config_path()?, cli.debug).await,
        Command::Config { action } => {
            let config_path = cli.config_path()?;
            match action {
                ConfigAction::Dump => commands::config::dump(&config_path),
                ConfigAction::Validate => commands::config::validate(&config_path),
                ConfigAction::Path => commands::config::path(&config_path),
            }
        }
        Command::Send { event } => commands::send::send(&client(&cli), *event).await,
        Command::Status { json } => commands::status::status(&client(&cli), *json).await,
        Command::Ping => commands::send::ping(&client(&cli)).await,
    }
}

/// Resolves the control socket: flag or environment, then the config file,
/// then the default location.
fn client(cli: &Cli) -> SocketClient {
    let path = cli
        .socket_path
        .clone()
        .or_else(|| cli.config_path().ok().and_then(|p| configured_socket(&p)))
        .unwrap_or_else(default_socket_path);
    debug!(socket = %path.display(), "using control socket");
    SocketClient::new(path, cli.timeout())
}

fn configured_socket(config_path: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(config_path).ok()?;
    DaemonConfig::from_toml(&content)
        .ok()
        .map(|config| config.socket_path)
}
