//! Single-instance guard.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};

/// Holds the daemon's PID file for its lifetime; the file is removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claims `path` for this process.
    ///
    /// An existing file naming a live process is an [`ServerError::AlreadyRunning`].
    /// Files naming dead processes, or holding garbage, are replaced.
    pub fn acquire(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();

        match fs::read_to_string(&path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) if pid_alive(pid) => {
                    return Err(ServerError::already_running(path.to_string_lossy()));
                }
                Ok(pid) => {
                    warn!(path = %path.display(), pid, "Replacing PID file of dead process");
                    fs::remove_file(&path)?;
                }
                Err(_) => {
                    warn!(path = %path.display(), "Replacing unreadable PID file");
                    fs::remove_file(&path)?;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let pid = process::id();
        let mut file = fs::File::create(&path)?;
        writeln!(file, "{pid}")?;
        file.sync_all()?;

        info!(path = %path.display(), pid, "Wrote PID file");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed PID file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove PID file"),
        }
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 performs the permission and existence checks only.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

/// Returns the default PID file path.
///
/// Uses `$XDG_RUNTIME_DIR/busylight.pid` if available,
/// otherwise falls back to `/tmp/busylight-$UID.pid`.
pub fn default_pid_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("busylight.pid")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/busylight-{uid}.pid"))
    }
}
