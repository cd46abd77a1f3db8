//! External notification events.
//!
//! Every trigger the daemon reacts to (a Unix signal, a control-socket
//! message, a CLI invocation) is translated into one [`Event`] before it
//! reaches the control loop.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A discrete notification delivered to the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Event {
    /// In a call, microphone muted.
    ZoomMuted,
    /// In a call, microphone open.
    ZoomOpenMic,
    /// Call ended.
    ZoomEnded,
    /// Flip the urgent indicator.
    ToggleUrgent,
    /// Flip the low-priority overlay.
    ToggleLowPriority,
    /// Flip between active and idle.
    ToggleActive,
    /// Re-read the calendars now.
    #[serde(rename = "refresh")]
    ForceRefresh,
    /// Shut the daemon down.
    Terminate,
}

impl Event {
    /// Every event, in declaration order.
    pub const ALL: [Event; 8] = [
        Event::ZoomMuted,
        Event::ZoomOpenMic,
        Event::ZoomEnded,
        Event::ToggleUrgent,
        Event::ToggleLowPriority,
        Event::ToggleActive,
        Event::ForceRefresh,
        Event::Terminate,
    ];

    /// Returns the wire name of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZoomMuted => "zoom-muted",
            Self::ZoomOpenMic => "zoom-open-mic",
            Self::ZoomEnded => "zoom-ended",
            Self::ToggleUrgent => "toggle-urgent",
            Self::ToggleLowPriority => "toggle-low-priority",
            Self::ToggleActive => "toggle-active",
            Self::ForceRefresh => "refresh",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unrecognised event name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event '{name}' (expected one of: {})", expected_names())]
pub struct UnknownEvent {
    pub name: String,
}

fn expected_names() -> String {
    Event::ALL
        .iter()
        .map(Event::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl FromStr for Event {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase().replace('_', "-");
        Event::ALL
            .into_iter()
            .find(|event| event.as_str() == name)
            .ok_or_else(|| UnknownEvent {
                name: s.to_string(),
            })
    }
}
