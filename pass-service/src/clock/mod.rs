//! # Clock
//!
//! Access evaluation is a pure function of ledger state and wall-clock time,
//! so time is injected. The service runs on [`SystemClock`]; tests and
//! simulations drive a [`ManualClock`].

use chrono::{DateTime, Duration, SubsecRound, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of the current time, at whole-second precision
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start.trunc_subsecs(0)),
        }
    }

    /// Start at the given unix timestamp
    pub fn at_unix(secs: i64) -> Self {
        let start = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_default();
        Self::new(start)
    }

    /// Move time forward by `secs` seconds
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now += Duration::seconds(secs);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at.trunc_subsecs(0);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
