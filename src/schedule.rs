// src/schedule.rs
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock moved by hand. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

fn to_chrono(d: StdDuration) -> Duration {
    Duration::from_std(d).unwrap_or(Duration::MAX)
}

fn add_saturating(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Trailing-edge debounce of a single task.
///
/// Each `schedule` pushes the deadline to `now + delay`, but never past
/// `first schedule + max_wait`. The owner calls `poll` with the current time
/// and runs the task when it returns `true`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    max_wait: Option<Duration>,
    first_scheduled: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
}

impl Debouncer {
    pub fn new(delay: StdDuration) -> Self {
        Self {
            delay: to_chrono(delay),
            max_wait: None,
            first_scheduled: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: StdDuration) -> Self {
        self.max_wait = Some(to_chrono(max_wait));
        self
    }

    pub fn schedule(&mut self, now: DateTime<Utc>) {
        let first = *self.first_scheduled.get_or_insert(now);
        let mut deadline = add_saturating(now, self.delay);
        if let Some(max_wait) = self.max_wait {
            deadline = deadline.min(add_saturating(first, max_wait));
        }
        self.deadline = Some(deadline);
    }

    /// Drops the pending run. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.first_scheduled = None;
        self.deadline.take().is_some()
    }

    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub const fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Returns `true` exactly once per scheduled run, when its deadline has passed.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.cancel();
                true
            }
            _ => false,
        }
    }
}
