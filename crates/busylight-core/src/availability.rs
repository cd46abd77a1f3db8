//! Calendar availability tracking.
//!
//! [`AvailabilityScheduler`] owns the merged busy schedule obtained from the
//! most recent calendar poll and answers two questions: "is the user busy
//! right now?" and "when does that answer next change?".
//!
//! The scheduler never talks to a calendar itself. When trimming expired
//! periods leaves it empty and the last poll is old, [`expire_elapsed`]
//! reports [`Freshness::Stale`] and the caller is expected to fetch new data
//! and hand it to [`refresh`].
//!
//! [`expire_elapsed`]: AvailabilityScheduler::expire_elapsed
//! [`refresh`]: AvailabilityScheduler::refresh

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use crate::merge::MergedSchedule;
use crate::time::{BusyPeriod, TimeWindow};

/// Tuning knobs for [`AvailabilityScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityConfig {
    /// How far ahead each calendar query looks.
    pub horizon: Duration,
    /// Buffer applied when comparing "now" against period edges.
    pub guard_margin: Duration,
    /// Age after which an empty schedule should be re-fetched.
    pub staleness: Duration,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::hours(8),
            guard_margin: Duration::seconds(5),
            staleness: Duration::minutes(30),
        }
    }
}

impl AvailabilityConfig {
    /// Builder: set the query horizon.
    #[must_use]
    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    /// Builder: set the guard margin.
    #[must_use]
    pub fn with_guard_margin(mut self, guard_margin: Duration) -> Self {
        self.guard_margin = guard_margin;
        self
    }

    /// Builder: set the staleness threshold.
    #[must_use]
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }
}

/// Outcome of [`AvailabilityScheduler::expire_elapsed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The schedule still carries information, or was polled recently.
    Fresh,
    /// The schedule is empty and the last poll is older than the staleness
    /// threshold (or never happened). A refresh is due.
    Stale,
}

/// Owner of the merged busy schedule.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityScheduler {
    config: AvailabilityConfig,
    schedule: MergedSchedule,
    last_poll: Option<DateTime<Utc>>,
}

impl AvailabilityScheduler {
    /// Creates an empty scheduler that has never been polled.
    pub fn new(config: AvailabilityConfig) -> Self {
        Self {
            config,
            schedule: MergedSchedule::new(),
            last_poll: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AvailabilityConfig {
        &self.config
    }

    /// Returns the window a calendar query issued at `now` must cover.
    pub fn query_window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::from_now(now, self.config.horizon)
    }

    /// Replaces the schedule with the merge of `periods` polled at `now`.
    ///
    /// `periods` must come from a query over [`query_window(now)`]. A failed
    /// query should simply not call this, leaving the previous schedule in
    /// place.
    ///
    /// [`query_window(now)`]: Self::query_window
    pub fn refresh(&mut self, periods: impl IntoIterator<Item = BusyPeriod>, now: DateTime<Utc>) {
        self.schedule = MergedSchedule::merge(periods);
        self.last_poll = Some(now);
        debug!(
            periods = self.schedule.len(),
            polled_at = %now,
            "Busy schedule replaced"
        );
    }

    /// Drops periods that have ended (within the guard margin) and reports
    /// whether the schedule has gone stale.
    pub fn expire_elapsed(&mut self, now: DateTime<Utc>) -> Freshness {
        let cutoff = now + self.config.guard_margin;
        while let Some(front) = self.schedule.front() {
            if front.end() > cutoff {
                break;
            }
            trace!(period = %front, "Busy period elapsed");
            self.schedule.pop_front();
        }

        if self.schedule.is_empty() && self.is_poll_older_than_staleness(now) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// Returns true if the earliest unexpired period has started, allowing for
    /// the guard margin.
    pub fn is_busy_now(&mut self, now: DateTime<Utc>) -> bool {
        self.expire_elapsed(now);
        self.front_has_started(now)
    }

    /// Returns the next moment the busy/free status is expected to change.
    ///
    /// With nothing scheduled this is the end of the query horizon, since no
    /// information exists beyond it.
    pub fn next_transition_time(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.expire_elapsed(now);
        match self.schedule.front() {
            None => now + self.config.horizon,
            Some(front) if self.front_has_started(now) => front.end(),
            Some(front) => front.start(),
        }
    }

    /// Returns the current schedule.
    pub fn schedule(&self) -> &MergedSchedule {
        &self.schedule
    }

    /// Returns when the schedule was last refreshed.
    pub fn last_poll_time(&self) -> Option<DateTime<Utc>> {
        self.last_poll
    }

    fn front_has_started(&self, now: DateTime<Utc>) -> bool {
        self.schedule
            .front()
            .is_some_and(|front| front.start() <= now + self.config.guard_margin)
    }

    fn is_poll_older_than_staleness(&self, now: DateTime<Utc>) -> bool {
        match self.last_poll {
            Some(polled) => now - polled > self.config.staleness,
            None => true,
        }
    }
}
