//! Time source and calendar arithmetic.
//!
//! Ledger accrual counts days in the configured [`AccrualZone`] (server-local
//! by default) while presentation code formats calendar days in the client's
//! own offset. The two are deliberately kept apart.

pub mod calendar;

pub use calendar::{AccrualZone, client_day_string, client_offset, elapsed_days};

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of "now". Injected everywhere so tests can travel in time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
