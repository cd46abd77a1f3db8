//! Merging raw busy periods into a canonical schedule.
//!
//! Calendars report busy spans independently, so the combined list may be
//! unordered, overlapping, or made of periods that touch end to start. The
//! [`MergedSchedule`] produced here is sorted by start time and contains no
//! two entries that overlap or abut.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::time::BusyPeriod;

/// Sorted, pairwise disjoint and non-adjacent busy periods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedSchedule {
    periods: VecDeque<BusyPeriod>,
}

impl MergedSchedule {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an unordered collection of busy periods.
    ///
    /// Periods are stable-sorted by start, then scanned once: a period that
    /// starts strictly after the running end closes the current span, anything
    /// else extends it to the larger of the two ends.
    pub fn merge(periods: impl IntoIterator<Item = BusyPeriod>) -> Self {
        let mut sorted: Vec<BusyPeriod> = periods.into_iter().collect();
        sorted.sort_by_key(|p| p.start());

        let mut merged: VecDeque<BusyPeriod> = VecDeque::with_capacity(sorted.len());
        let mut current: Option<BusyPeriod> = None;

        for period in sorted {
            current = Some(match current {
                None => period,
                Some(acc) if period.start() > acc.end() => {
                    merged.push_back(acc);
                    period
                }
                Some(acc) => acc.with_end(acc.end().max(period.end())),
            });
        }

        if let Some(acc) = current {
            merged.push_back(acc);
        }

        Self { periods: merged }
    }

    /// Returns the earliest period, if any.
    pub fn front(&self) -> Option<&BusyPeriod> {
        self.periods.front()
    }

    /// Returns the number of merged periods.
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    /// Returns true if no busy periods remain.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Iterates over the periods in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = &BusyPeriod> {
        self.periods.iter()
    }

    /// Copies the periods into a vector.
    pub fn to_vec(&self) -> Vec<BusyPeriod> {
        self.periods.iter().copied().collect()
    }

    pub(crate) fn pop_front(&mut self) -> Option<BusyPeriod> {
        self.periods.pop_front()
    }
}

impl FromIterator<BusyPeriod> for MergedSchedule {
    fn from_iter<I: IntoIterator<Item = BusyPeriod>>(iter: I) -> Self {
        Self::merge(iter)
    }
}

impl<'a> IntoIterator for &'a MergedSchedule {
    type Item = &'a BusyPeriod;
    type IntoIter = std::collections::vec_deque::Iter<'a, BusyPeriod>;

    fn into_iter(self) -> Self::IntoIter {
        self.periods.iter()
    }
}
