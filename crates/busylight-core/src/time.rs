//! Time types for availability tracking.
//!
//! This module provides [`BusyPeriod`] for a single occupied span reported by
//! a calendar, [`TimeWindow`] for defining query ranges, and the [`Clock`]
//! trait used by the daemon to read the current time.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing time values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The period ends before it starts.
    #[error("busy period ends ({end}) before it starts ({start})")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// A half-open interval `[start, end)` during which a calendar is occupied.
///
/// The invariant `start <= end` is checked on construction and on
/// deserialization, so every value in circulation is well formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct BusyPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawPeriod> for BusyPeriod {
    type Error = TimeError;

    fn try_from(raw: RawPeriod) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl BusyPeriod {
    /// Creates a new busy period.
    ///
    /// Returns [`TimeError::EndBeforeStart`] if `end` precedes `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeError> {
        if end < start {
            return Err(TimeError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// Start of the period (inclusive).
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the period (exclusive).
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns the length of the period.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if a datetime falls within this period.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Returns true if this period spans the whole window, give or take
    /// `tolerance` at each edge.
    ///
    /// Only aggregate busy spans are visible through a free/busy query, so this
    /// is the closest available approximation of "an all-day event".
    pub fn covers_window(&self, window: &TimeWindow, tolerance: Duration) -> bool {
        self.start < window.start + tolerance && self.end > window.end - tolerance
    }

    pub(crate) fn with_end(self, end: DateTime<Utc>) -> Self {
        Self {
            start: self.start,
            end: end.max(self.start),
        }
    }
}

impl fmt::Display for BusyPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// A time window for querying calendar availability.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Creates a time window starting from now extending the given duration.
    pub fn from_now(now: DateTime<Utc>, duration: Duration) -> Self {
        Self::new(now, now + duration)
    }
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
