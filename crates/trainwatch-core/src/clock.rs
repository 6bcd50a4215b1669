//! Wall-clock source for the reconciliation engine.
//!
//! Staleness and speed derivation both read "now". Routing every read
//! through [`Clock`] lets tests drive time by hand with [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// A source of wall-clock time in Unix milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current reading.
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `start_ms`.
    pub const fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Jump to an absolute reading.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::Release);
    }

    /// Move forward by `delta_ms` and return the new reading.
    pub fn advance(&self, delta_ms: i64) -> i64 {
        let prev = self.now.fetch_add(delta_ms, Ordering::AcqRel);
        prev.saturating_add(delta_ms)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
