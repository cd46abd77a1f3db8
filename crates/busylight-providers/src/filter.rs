//! Per-calendar policy applied to free/busy responses.

use std::collections::BTreeMap;

use busylight_core::{BusyPeriod, TimeWindow};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::provider::FreeBusyResponse;

/// Slack, in seconds, allowed at each window edge when deciding that a busy
/// span covers the whole query window.
pub const ALL_DAY_TOLERANCE_SECS: i64 = 5;

/// Settings for one monitored calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarSettings {
    /// Name used in logs. Falls back to the calendar id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Drop busy spans that cover the entire query window.
    pub ignore_all_day_events: bool,
}

impl CalendarSettings {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ignore_all_day_events: false,
        }
    }

    #[must_use]
    pub fn ignoring_all_day(mut self) -> Self {
        self.ignore_all_day_events = true;
        self
    }
}

/// Name a calendar is logged under.
fn calendar_title(id: &str, settings: Option<&CalendarSettings>) -> String {
    match settings {
        Some(s) => s.title.clone().unwrap_or_else(|| id.to_string()),
        None => format!("UNKNOWN<{id}>"),
    }
}

/// Flattens a response into the busy periods that should count.
///
/// Calendars missing from `settings` are still counted but logged under
/// `UNKNOWN<id>`. Per-calendar errors are logged and contribute nothing.
pub fn collect_busy_periods(
    response: FreeBusyResponse,
    settings: &BTreeMap<String, CalendarSettings>,
    window: &TimeWindow,
) -> Vec<BusyPeriod> {
    let tolerance = Duration::seconds(ALL_DAY_TOLERANCE_SECS);
    let mut periods = Vec::new();

    for (id, calendar) in response.calendars {
        let (title, ignore_all_day) = match settings.get(&id) {
            Some(s) => (calendar_title(&id, Some(s)), s.ignore_all_day_events),
            None => {
                let title = calendar_title(&id, None);
                warn!(calendar = %title, "Response includes a calendar that is not configured");
                (title, false)
            }
        };

        for reason in &calendar.errors {
            error!(calendar = %title, reason = %reason, "Calendar reported an error");
        }

        let before = periods.len();
        for period in calendar.busy {
            if ignore_all_day && period.covers_window(window, tolerance) {
                debug!(calendar = %title, period = %period, "Skipping all-day busy span");
                continue;
            }
            periods.push(period);
        }
        debug!(calendar = %title, count = periods.len() - before, "Collected busy periods");
    }

    periods
}
