//! Daemon error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for daemon operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised by the daemon.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] busylight_protocol::ProtocolError),

    #[error("Calendar error: {0}")]
    Provider(#[from] busylight_providers::ProviderError),

    #[error("Logging setup failed: {0}")]
    Tracing(#[from] busylight_core::TracingError),

    #[error("Socket path already in use: {path}")]
    SocketInUse { path: String },

    #[error("Socket path parent directory does not exist: {path}")]
    SocketPathInvalid { path: String },

    #[error("Daemon is already running (PID file exists: {path})")]
    AlreadyRunning { path: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// No usable light device was found or it could not be configured.
    #[error("Device error: {message}")]
    Device { message: String },

    /// A collaborator took longer than allowed.
    #[error("Timed out during {operation}")]
    Timeout { operation: &'static str },

    /// The control loop is gone.
    #[error("Control loop is not running")]
    LoopClosed,
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    pub fn timeout(operation: &'static str) -> Self {
        Self::Timeout { operation }
    }

    pub fn socket_in_use(path: impl Into<String>) -> Self {
        Self::SocketInUse { path: path.into() }
    }

    pub fn socket_path_invalid(path: impl Into<String>) -> Self {
        Self::SocketPathInvalid { path: path.into() }
    }

    pub fn already_running(path: impl Into<String>) -> Self {
        Self::AlreadyRunning { path: path.into() }
    }
}
