//! Daemon command: runs the control loop in the foreground.

use std::path::Path;

use busylight_server::{DaemonOptions, run_daemon};

use crate::error::ClientResult;

/// Runs the daemon until it receives a terminate event.
pub async fn run(config_path: &Path, debug: bool) -> ClientResult<()> {
    run_daemon(DaemonOptions {
        config_path: config_path.to_path_buf(),
        debug,
    })
    .await?;
    Ok(())
}
