//! Calendar-backed availability.
//!
//! Wraps the pure [`AvailabilityScheduler`] with the calendar source that
//! feeds it. Reads go through [`AvailabilityTracker::evaluate`], which polls
//! the calendar again whenever the scheduler reports its schedule as stale.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use busylight_core::{AvailabilityConfig, AvailabilityScheduler, Freshness, MergedSchedule};
use busylight_providers::{CalendarSettings, CalendarSource, FreeBusyQuery, collect_busy_periods};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};

/// Busy state at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub busy: bool,
    pub next_transition: DateTime<Utc>,
}

pub struct AvailabilityTracker {
    scheduler: AvailabilityScheduler,
    source: Arc<dyn CalendarSource>,
    calendars: BTreeMap<String, CalendarSettings>,
    timeout: Duration,
}

impl AvailabilityTracker {
    pub fn new(
        source: Arc<dyn CalendarSource>,
        calendars: BTreeMap<String, CalendarSettings>,
        timeout: Duration,
    ) -> Self {
        Self {
            scheduler: AvailabilityScheduler::default(),
            source,
            calendars,
            timeout,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AvailabilityConfig) -> Self {
        self.scheduler = AvailabilityScheduler::new(config);
        self
    }

    /// Swaps in a new source and calendar set after a configuration reload.
    ///
    /// The current schedule is kept until the next refresh.
    pub fn update(
        &mut self,
        source: Arc<dyn CalendarSource>,
        calendars: BTreeMap<String, CalendarSettings>,
        timeout: Duration,
    ) {
        self.source = source;
        self.calendars = calendars;
        self.timeout = timeout;
    }

    /// Polls the calendar and replaces the schedule.
    ///
    /// On failure the previous schedule and poll time are kept. Returns the
    /// number of merged periods.
    pub async fn refresh(&mut self, now: DateTime<Utc>) -> ServerResult<usize> {
        let window = self.scheduler.query_window(now);
        let query = FreeBusyQuery::new(self.calendars.keys(), window);
        debug!(
            source = self.source.name(),
            calendars = self.calendars.len(),
            start = %window.start,
            end = %window.end,
            "Querying free/busy"
        );

        let response = tokio::time::timeout(self.timeout, self.source.query_free_busy(query))
            .await
            .map_err(|_| ServerError::timeout("calendar query"))??;

        let periods = collect_busy_periods(response, &self.calendars, &window);
        self.scheduler.refresh(periods, now);

        let merged = self.scheduler.schedule().len();
        info!(periods = merged, "Refreshed busy schedule");
        Ok(merged)
    }

    /// Reports whether `now` is busy and when that next changes.
    ///
    /// A stale schedule triggers one refresh first. A failed refresh is
    /// logged and the remaining schedule is used as-is.
    pub async fn evaluate(&mut self, now: DateTime<Utc>) -> Evaluation {
        if self.scheduler.expire_elapsed(now) == Freshness::Stale {
            debug!(last_poll = ?self.scheduler.last_poll_time(), "Schedule is stale");
            if let Err(e) = self.refresh(now).await {
                warn!(error = %e, "Calendar refresh failed, keeping previous schedule");
            }
        }

        Evaluation {
            busy: self.scheduler.is_busy_now(now),
            next_transition: self.scheduler.next_transition_time(now),
        }
    }

    pub fn schedule(&self) -> &MergedSchedule {
        self.scheduler.schedule()
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        self.scheduler.last_poll_time()
    }
}
