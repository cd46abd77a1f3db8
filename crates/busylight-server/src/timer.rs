//! Resettable one-shot timer polled from the event loop.

use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, Sleep};
use tracing::trace;

/// A one-shot timer owned by the event loop.
///
/// [`Timer::fired`] is cancel-safe: if the deadline passes while the loop is
/// busy elsewhere, the firing is delivered on the next poll. Re-arming or
/// stopping first discards it.
#[derive(Debug)]
pub struct Timer {
    name: &'static str,
    sleep: Option<Pin<Box<Sleep>>>,
    armed: bool,
    generation: u64,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sleep: None,
            armed: false,
            generation: 0,
        }
    }

    /// Arms the timer for a wall-clock deadline, measured against `now`.
    ///
    /// Deadlines in the past fire on the next poll.
    pub fn arm_at(&mut self, deadline: DateTime<Utc>, now: DateTime<Utc>) {
        let delay = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        self.arm_after(delay);
    }

    pub fn arm_after(&mut self, delay: Duration) {
        self.arm_until(Instant::now() + delay);
    }

    /// Arms the timer one `period` after its previous deadline, keeping a
    /// fixed cadence regardless of how long the firing took to handle.
    ///
    /// Missed periods are skipped rather than delivered in a burst.
    pub fn arm_next(&mut self, period: Duration) {
        let now = Instant::now();
        let next = match self.sleep.as_ref() {
            Some(sleep) if sleep.deadline() + period > now => sleep.deadline() + period,
            _ => now + period,
        };
        self.arm_until(next);
    }

    fn arm_until(&mut self, deadline: Instant) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
        self.armed = true;
        self.generation += 1;
        trace!(timer = self.name, generation = self.generation, ?deadline, "Armed timer");
    }

    pub fn stop(&mut self) {
        self.armed = false;
        self.generation += 1;
        trace!(timer = self.name, generation = self.generation, "Stopped timer");
    }

    /// Bumped by every arm and stop.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Completes once the current deadline passes. Never completes while stopped.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) if self.armed => {
                sleep.as_mut().await;
                self.armed = false;
            }
            _ => std::future::pending::<()>().await,
        }
    }
}
