//! A controllable clock adapter.

use chrono::{DateTime, Duration, Utc};
use gantry_core::ports::Clock;
use std::sync::Mutex;

/// Clock pinned to an explicit instant, advanced manually. State-machine
/// entry points take a [`Clock`] precisely so tests can control time.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock poisoned") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}
