// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time source for the engine.
//!
//! Everything that stamps a row (job creation, claims, completions,
//! stale-claim cutoffs) goes through a [`Clock`] so tests can pin or
//! advance time instead of sleeping.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time.
///
/// `now` is monotonic (durations, backoff); `epoch_ms` is wall-clock
/// milliseconds, the form persisted on scan and job rows.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[derive(Clone, Copy)]
struct FakeNow {
    instant: Instant,
    epoch_ms: u64,
}

/// Controllable clock for tests. Time moves only through
/// [`advance`](FakeClock::advance) and
/// [`set_epoch_ms`](FakeClock::set_epoch_ms); clones share the same
/// instant, so a queue and the test driving it agree on "now".
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<FakeNow>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(FakeNow {
                instant: Instant::now(),
                epoch_ms: 1_000_000,
            })),
        }
    }

    /// Advance both the monotonic and wall-clock readings.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        now.instant += duration;
        now.epoch_ms += duration.as_millis() as u64;
    }

    /// Pin the wall-clock reading (row timestamps) to a known value.
    pub fn set_epoch_ms(&self, ms: u64) {
        self.now.lock().epoch_ms = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.now.lock().instant
    }

    fn epoch_ms(&self) -> u64 {
        self.now.lock().epoch_ms
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
