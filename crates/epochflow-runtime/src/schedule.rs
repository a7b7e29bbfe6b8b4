//! Periodic epoch schedule
//!
//! Epochs fall on the grid `on + k * every`. The schedule is clocked by the
//! times it witnesses (point, tick and mark timestamps) rather than by the
//! wall clock: it starts at the first witnessed time and reports every grid
//! point that a later witnessed time reaches, one at a time and in order.

use chrono::{DateTime, Duration, Utc};
use epochflow_core::time::align_after;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct EpochSchedule {
    every: Duration,
    on: DateTime<Utc>,
    to: Option<DateTime<Utc>>,
    started: bool,
    /// `None` once the grid runs past the representable range.
    next: Option<DateTime<Utc>>,
}

impl EpochSchedule {
    /// A schedule of epochs every `every`, aligned on `on`, stopping after
    /// `to`.
    pub fn new(every: Duration, on: DateTime<Utc>, to: Option<DateTime<Utc>>) -> Self {
        Self {
            every,
            on,
            to,
            started: false,
            next: None,
        }
    }

    pub fn every(&self) -> Duration {
        self.every
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Next epoch to fire; `None` until started.
    pub fn next_epoch(&self) -> Option<DateTime<Utc>> {
        self.next
    }

    /// Start at `t`: the first epoch is the first grid point after it.
    /// Has no effect once started.
    pub fn start(&mut self, t: DateTime<Utc>) {
        if self.started {
            return;
        }
        self.started = true;
        self.next = align_after(t, self.on, self.every);
        debug!(
            "Epoch schedule starting at {} with interval {}, first epoch {:?}",
            t, self.every, self.next
        );
    }

    /// Pop the next epoch reached by `t`, if any.
    ///
    /// Call repeatedly until `None` to drain every elapsed epoch. Nothing is
    /// due past `to`.
    pub fn due(&mut self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.started {
            self.start(t);
            return None;
        }
        let next = self.next?;
        if next > t || self.to.is_some_and(|to| next > to) {
            return None;
        }
        self.next = next.checked_add_signed(self.every);
        Some(next)
    }

    /// Every epoch reached by `t`, in order.
    pub fn drain(&mut self, t: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        std::iter::from_fn(|| self.due(t)).collect()
    }
}
