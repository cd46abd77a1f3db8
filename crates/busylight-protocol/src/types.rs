//! Request and response types for the control socket.

use busylight_core::{BusyPeriod, DisplayState, Event, ResolvedIndicator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PROTOCOL_VERSION;

/// Wrapper around every message on the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub protocol_version: String,
    /// Correlates a response with its request.
    pub request_id: String,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates an envelope stamped with the current protocol version.
    pub fn new(request_id: impl Into<String>, payload: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_id: request_id.into(),
            payload,
        }
    }

    pub fn request(request_id: impl Into<String>, request: T) -> Self {
        Self::new(request_id, request)
    }

    pub fn response(request_id: impl Into<String>, response: T) -> Self {
        Self::new(request_id, response)
    }

    /// Checks if this envelope uses a compatible protocol version.
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

/// Messages sent from the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Deliver an event to the control loop.
    Notify { event: Event },
    /// Report the current display and schedule.
    Status,
    /// Liveness check.
    Ping,
}

impl Request {
    pub fn notify(event: Event) -> Self {
        Self::Notify { event }
    }
}

/// Messages sent from the daemon back to the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// The event was queued for the control loop.
    Ack,
    Status {
        #[serde(flatten)]
        info: Box<StatusInfo>,
    },
    Pong,
    Error {
        #[serde(flatten)]
        error: ErrorResponse,
    },
}

impl Response {
    pub fn status(info: StatusInfo) -> Self {
        Self::Status {
            info: Box::new(info),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorResponse::new(code, message),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }

    pub fn as_error(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// Snapshot of the daemon's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub uptime_seconds: u64,
    pub display: DisplayState,
    /// What the light is showing.
    pub indicator: ResolvedIndicator,
    /// Remaining merged busy periods, earliest first.
    #[serde(default)]
    pub busy_periods: Vec<BusyPeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll: Option<DateTime<Utc>>,
    /// When the busy/free status is next re-evaluated. Absent while inactive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_transition: Option<DateTime<Utc>>,
    /// Device the light is attached to, if open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl StatusInfo {
    pub fn new(uptime_seconds: u64, display: DisplayState) -> Self {
        Self {
            uptime_seconds,
            display,
            indicator: display.resolve(),
            busy_periods: Vec::new(),
            last_poll: None,
            next_transition: None,
            device: None,
        }
    }

    #[must_use]
    pub fn with_busy_periods(mut self, periods: Vec<BusyPeriod>) -> Self {
        self.busy_periods = periods;
        self
    }

    #[must_use]
    pub fn with_last_poll(mut self, last_poll: Option<DateTime<Utc>>) -> Self {
        self.last_poll = last_poll;
        self
    }

    #[must_use]
    pub fn with_next_transition(mut self, next: Option<DateTime<Utc>>) -> Self {
        self.next_transition = next;
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }
}

/// Error codes carried in [`Response::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InternalError,
    InvalidRequest,
    Timeout,
    ShuttingDown,
}

impl ErrorCode {
    /// Returns a human-readable description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InternalError => "An internal error occurred",
            Self::InvalidRequest => "The request was invalid",
            Self::Timeout => "The request timed out",
            Self::ShuttingDown => "Daemon is shutting down",
        }
    }
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}
