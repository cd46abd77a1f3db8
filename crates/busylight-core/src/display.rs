//! Indicator state resolution.
//!
//! [`DisplayState`] holds the handful of flags that decide what the light
//! shows; [`DisplayState::resolve`] turns them into exactly one
//! [`ResolvedIndicator`]. The mapping from indicator to the bytes written to
//! the device lives here too, so the hardware side only ever sees a frame.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// A single light code understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Light {
    Blue,
    Green,
    Off,
    Red,
    SecondaryRed,
    RedFlash,
    Urgent,
    Yellow,
    LowPriority,
}

impl Light {
    /// Returns the command byte for this light.
    pub fn code(self) -> u8 {
        match self {
            Self::Blue => b'B',
            Self::Green => b'G',
            Self::Off => b'X',
            Self::Red => b'R',
            Self::SecondaryRed => b'2',
            Self::RedFlash => b'#',
            Self::Urgent => b'%',
            Self::Yellow => b'Y',
            Self::LowPriority => b'@',
        }
    }
}

/// Light sequence played when the device is opened.
pub const STARTUP_PATTERN: &[(Light, Duration)] = &[
    (Light::Blue, Duration::from_millis(100)),
    (Light::Off, Duration::from_millis(50)),
    (Light::Blue, Duration::from_millis(100)),
    (Light::Off, Duration::ZERO),
];

/// Light sequence played before the device is released.
pub const SHUTDOWN_PATTERN: &[(Light, Duration)] = &[
    (Light::SecondaryRed, Duration::from_millis(100)),
    (Light::Off, Duration::from_millis(50)),
    (Light::SecondaryRed, Duration::from_millis(100)),
    (Light::Off, Duration::ZERO),
];

/// Primary indicator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndicatorCommand {
    Green,
    Yellow,
    RedSolid,
    RedFlashing,
    UrgentFlash,
    Off,
}

impl IndicatorCommand {
    /// Returns the device light for this command.
    pub fn light(self) -> Light {
        match self {
            Self::Green => Light::Green,
            Self::Yellow => Light::Yellow,
            Self::RedSolid => Light::Red,
            Self::RedFlashing => Light::RedFlash,
            Self::UrgentFlash => Light::Urgent,
            Self::Off => Light::Off,
        }
    }

    /// Returns a short human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::RedSolid => "red-solid",
            Self::RedFlashing => "red-flashing",
            Self::UrgentFlash => "urgent-flash",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for IndicatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one thing the light should show: a primary command plus the
/// low-priority overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedIndicator {
    pub command: IndicatorCommand,
    pub low_priority_overlay: bool,
}

impl ResolvedIndicator {
    /// The indicator for an inactive daemon.
    pub const OFF: Self = Self {
        command: IndicatorCommand::Off,
        low_priority_overlay: false,
    };

    /// Returns the bytes to send to the device in a single write.
    pub fn frame(&self) -> Vec<u8> {
        let mut frame = vec![self.command.light().code()];
        if self.low_priority_overlay {
            frame.push(Light::LowPriority.code());
        }
        frame
    }
}

impl fmt::Display for ResolvedIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low_priority_overlay {
            write!(f, "{}+low-priority", self.command)
        } else {
            write!(f, "{}", self.command)
        }
    }
}

/// Side effect the control loop must carry out after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Only flags changed.
    None,
    /// The daemon went from inactive to active.
    Activated,
    /// The daemon went from active to inactive.
    Deactivated,
    /// An out-of-band schedule refresh was requested.
    RefreshRequested,
    /// The loop should exit.
    Terminate,
}

/// Flags feeding the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    pub daemon_active: bool,
    pub calendar_busy: bool,
    pub zoom_active: bool,
    pub zoom_muted: bool,
    pub urgent: bool,
    pub low_priority: bool,
}

impl DisplayState {
    /// Baseline state: inactive, every flag cleared.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Resolves the flags into a single indicator.
    ///
    /// While inactive the light is off and the overlay is suppressed. While
    /// active the first matching rule wins: urgent, muted call, open call,
    /// calendar busy, free.
    pub fn resolve(&self) -> ResolvedIndicator {
        if !self.daemon_active {
            return ResolvedIndicator::OFF;
        }

        let command = if self.urgent {
            IndicatorCommand::UrgentFlash
        } else if self.zoom_active && self.zoom_muted {
            IndicatorCommand::RedSolid
        } else if self.zoom_active {
            IndicatorCommand::RedFlashing
        } else if self.calendar_busy {
            IndicatorCommand::Yellow
        } else {
            IndicatorCommand::Green
        };

        ResolvedIndicator {
            command,
            low_priority_overlay: self.low_priority,
        }
    }

    /// Applies an event and reports the side effect it requires.
    ///
    /// Deactivation resets every flag to the baseline.
    pub fn apply(&mut self, event: Event) -> Transition {
        match event {
            Event::ZoomMuted => {
                self.zoom_active = true;
                self.zoom_muted = true;
                Transition::None
            }
            Event::ZoomOpenMic => {
                self.zoom_active = true;
                self.zoom_muted = false;
                Transition::None
            }
            Event::ZoomEnded => {
                self.zoom_active = false;
                Transition::None
            }
            Event::ToggleUrgent => {
                self.urgent = !self.urgent;
                Transition::None
            }
            Event::ToggleLowPriority => {
                self.low_priority = !self.low_priority;
                Transition::None
            }
            Event::ToggleActive => {
                if self.daemon_active {
                    *self = Self::baseline();
                    Transition::Deactivated
                } else {
                    self.daemon_active = true;
                    Transition::Activated
                }
            }
            Event::ForceRefresh => Transition::RefreshRequested,
            Event::Terminate => Transition::Terminate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active() -> DisplayState {
        DisplayState {
            daemon_active: true,
            ..DisplayState::baseline()
        }
    }

    fn all_states() -> Vec<DisplayState> {
        (0u8..64)
            .map(|bits| DisplayState {
                daemon_active: bits & 1 != 0,
                calendar_busy: bits & 2 != 0,
                zoom_active: bits & 4 != 0,
                zoom_muted: bits & 8 != 0,
                urgent: bits & 16 != 0,
                low_priority: bits & 32 != 0,
            })
            .collect()
    }

    #[test]
    fn baseline_is_off() {
        assert_eq!(DisplayState::baseline().resolve(), ResolvedIndicator::OFF);
    }

    #[test]
    fn free_is_green() {
        assert_eq!(active().resolve().command, IndicatorCommand::Green);
    }

    #[test]
    fn busy_is_yellow() {
        let state = DisplayState {
            calendar_busy: true,
            ..active()
        };
        assert_eq!(state.resolve().command, IndicatorCommand::Yellow);
    }

    #[test]
    fn zoom_overrides_calendar() {
        let mut state = DisplayState {
            calendar_busy: true,
            zoom_active: true,
            zoom_muted: false,
            ..active()
        };
        assert_eq!(state.resolve().command, IndicatorCommand::RedFlashing);
        state.zoom_muted = true;
        assert_eq!(state.resolve().command, IndicatorCommand::RedSolid);
    }

    #[test]
    fn muted_flag_ignored_outside_call() {
        let state = DisplayState {
            zoom_muted: true,
            ..active()
        };
        assert_eq!(state.resolve().command, IndicatorCommand::Green);
    }

    #[test]
    fn urgent_dominates_when_active() {
        for state in all_states() {
            if state.daemon_active && state.urgent {
                assert_eq!(state.resolve().command, IndicatorCommand::UrgentFlash);
            }
        }
    }

    #[test]
    fn inactive_is_always_off_without_overlay() {
        for state in all_states() {
            if !state.daemon_active {
                assert_eq!(state.resolve(), ResolvedIndicator::OFF);
            }
        }
    }

    #[test]
    fn overlay_follows_low_priority_while_active() {
        for state in all_states() {
            if state.daemon_active {
                assert_eq!(state.resolve().low_priority_overlay, state.low_priority);
            }
        }
    }

    #[test]
    fn muted_call_with_low_priority() {
        let state = DisplayState {
            zoom_active: true,
            zoom_muted: true,
            low_priority: true,
            ..active()
        };
        let resolved = state.resolve();
        assert_eq!(resolved.command, IndicatorCommand::RedSolid);
        assert!(resolved.low_priority_overlay);
        assert_eq!(resolved.frame(), b"R@".to_vec());
    }

    #[test]
    fn frames_use_reserved_codes() {
        let frames: Vec<String> = [
            IndicatorCommand::Green,
            IndicatorCommand::Yellow,
            IndicatorCommand::RedSolid,
            IndicatorCommand::RedFlashing,
            IndicatorCommand::UrgentFlash,
            IndicatorCommand::Off,
        ]
        .into_iter()
        .map(|command| {
            let resolved = ResolvedIndicator {
                command,
                low_priority_overlay: false,
            };
            String::from_utf8(resolved.frame()).unwrap()
        })
        .collect();
        insta::assert_snapshot!(frames.join(" "), @"G Y R # % X");
    }

    #[test]
    fn display_labels() {
        let resolved = ResolvedIndicator {
            command: IndicatorCommand::Yellow,
            low_priority_overlay: true,
        };
        assert_eq!(resolved.to_string(), "yellow+low-priority");
        assert_eq!(ResolvedIndicator::OFF.to_string(), "off");
    }

    #[test]
    fn zoom_events() {
        let mut state = active();
        assert_eq!(state.apply(Event::ZoomMuted), Transition::None);
        assert!(state.zoom_active && state.zoom_muted);

        state.apply(Event::ZoomOpenMic);
        assert!(state.zoom_active && !state.zoom_muted);

        state.apply(Event::ZoomEnded);
        assert!(!state.zoom_active);
    }

    #[test]
    fn last_applied_wins() {
        let mut state = active();
        state.apply(Event::ZoomMuted);
        state.apply(Event::ZoomEnded);
        assert_eq!(state.resolve().command, IndicatorCommand::Green);

        state.apply(Event::ZoomEnded);
        state.apply(Event::ZoomMuted);
        assert_eq!(state.resolve().command, IndicatorCommand::RedSolid);
    }

    #[test]
    fn toggles_flip() {
        let mut state = active();
        state.apply(Event::ToggleUrgent);
        state.apply(Event::ToggleLowPriority);
        assert!(state.urgent && state.low_priority);
        state.apply(Event::ToggleUrgent);
        state.apply(Event::ToggleLowPriority);
        assert!(!state.urgent && !state.low_priority);
    }

    #[test]
    fn toggle_active_round_trip_resets_flags() {
        let mut state = active();
        state.apply(Event::ToggleUrgent);
        state.apply(Event::ZoomMuted);

        assert_eq!(state.apply(Event::ToggleActive), Transition::Deactivated);
        assert_eq!(state, DisplayState::baseline());

        assert_eq!(state.apply(Event::ToggleActive), Transition::Activated);
        assert!(state.daemon_active);
        assert!(!state.urgent && !state.zoom_active);
    }

    #[test]
    fn refresh_and_terminate_leave_flags() {
        let mut state = active();
        let before = state;
        assert_eq!(state.apply(Event::ForceRefresh), Transition::RefreshRequested);
        assert_eq!(state.apply(Event::Terminate), Transition::Terminate);
        assert_eq!(state, before);
    }

    #[test]
    fn patterns_end_dark() {
        assert_eq!(STARTUP_PATTERN.last().map(|(l, _)| *l), Some(Light::Off));
        assert_eq!(SHUTDOWN_PATTERN.last().map(|(l, _)| *l), Some(Light::Off));
    }
}
