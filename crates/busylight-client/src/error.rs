//! Client error types.

use std::fmt;

use busylight_protocol::{ErrorResponse, ProtocolError};
use busylight_server::ServerError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Connection to the daemon failed.
    Connection(String),
    /// Protocol/framing error.
    Protocol(String),
    /// Request timed out.
    Timeout(String),
    /// The daemon answered with an error.
    Rejected(ErrorResponse),
    /// The daemon itself failed.
    Daemon(ServerError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::Connection(msg) => write!(f, "connection error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Rejected(err) => write!(f, "daemon rejected request: {}", err.message),
            Self::Daemon(err) => write!(f, "daemon error: {err}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Daemon(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => Self::Io(e),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<ServerError> for ClientError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Config { message } => Self::Config(message),
            other => Self::Daemon(other),
        }
    }
}
