//! The [`CalendarSource`] trait.
//!
//! A source answers one kind of question: for each of these calendars, which
//! spans inside this window are busy? Only aggregate free/busy data is
//! exchanged, never event details.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use busylight_core::{BusyPeriod, TimeWindow};

use crate::error::{ProviderError, ProviderResult};

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A free/busy query over a set of calendars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBusyQuery {
    pub calendar_ids: Vec<String>,
    pub window: TimeWindow,
}

impl FreeBusyQuery {
    pub fn new(calendar_ids: impl IntoIterator<Item = impl Into<String>>, window: TimeWindow) -> Self {
        Self {
            calendar_ids: calendar_ids.into_iter().map(Into::into).collect(),
            window,
        }
    }
}

/// Busy spans and errors reported for one calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarBusy {
    pub busy: Vec<BusyPeriod>,
    /// Per-calendar errors such as "notFound"; the calendar's busy list is
    /// empty when these are present.
    pub errors: Vec<String>,
}

impl CalendarBusy {
    pub fn with_busy(busy: Vec<BusyPeriod>) -> Self {
        Self {
            busy,
            errors: Vec::new(),
        }
    }

    pub fn with_error(reason: impl Into<String>) -> Self {
        Self {
            busy: Vec::new(),
            errors: vec![reason.into()],
        }
    }
}

/// Result of a free/busy query, keyed by calendar id.
///
/// The server may answer for calendars that were not asked about, so the keys
/// are not guaranteed to match the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeBusyResponse {
    pub calendars: BTreeMap<String, CalendarBusy>,
}

impl FreeBusyResponse {
    #[must_use]
    pub fn with_calendar(mut self, id: impl Into<String>, busy: CalendarBusy) -> Self {
        self.calendars.insert(id.into(), busy);
        self
    }
}

/// A backend that can answer free/busy queries.
pub trait CalendarSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Queries busy spans for `query.calendar_ids` within `query.window`.
    ///
    /// # Errors
    ///
    /// Fails as a whole on transport or authentication problems. Problems
    /// limited to one calendar are reported in [`CalendarBusy::errors`].
    fn query_free_busy(&self, query: FreeBusyQuery) -> BoxFuture<'_, ProviderResult<FreeBusyResponse>>;
}

/// A source that always fails, for exercising refresh error paths.
#[derive(Debug)]
pub struct ErrorSource {
    name: String,
    error: ProviderError,
}

impl ErrorSource {
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }
}

impl CalendarSource for ErrorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_free_busy(&self, _query: FreeBusyQuery) -> BoxFuture<'_, ProviderResult<FreeBusyResponse>> {
        let error =
            ProviderError::new(self.error.code(), self.error.message()).with_provider(&self.name);
        Box::pin(async move { Err(error) })
    }
}

/// A source serving the same periods for every calendar asked about.
///
/// Periods outside the query window are clipped away.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    periods: Vec<BusyPeriod>,
}

impl StaticSource {
    pub fn new(periods: Vec<BusyPeriod>) -> Self {
        Self { periods }
    }
}

impl CalendarSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn query_free_busy(&self, query: FreeBusyQuery) -> BoxFuture<'_, ProviderResult<FreeBusyResponse>> {
        let window = query.window;
        let busy: Vec<BusyPeriod> = self
            .periods
            .iter()
            .filter(|p| p.end() > window.start && p.start() < window.end)
            .copied()
            .collect();
        let calendars = query
            .calendar_ids
            .into_iter()
            .map(|id| (id, CalendarBusy::with_busy(busy.clone())))
            .collect();
        Box::pin(async move { Ok(FreeBusyResponse { calendars }) })
    }
}
