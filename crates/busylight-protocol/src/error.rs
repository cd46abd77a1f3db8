//! Protocol error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while framing or parsing control messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: u32, max: u32 },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection closed before the whole frame arrived.
    #[error("incomplete message: expected {expected} bytes, got {received}")]
    IncompleteMessage { expected: usize, received: usize },

    #[error("empty message")]
    EmptyMessage,

    #[error("timeout during {operation} after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl ProtocolError {
    /// Creates a timeout error.
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }
}
