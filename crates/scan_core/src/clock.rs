//! Time: a pluggable unix-seconds source plus hour arithmetic.
//!
//! The schedulers never call `SystemTime` directly; they hold a
//! [`TimeSource`] so that tests (and replays) can drive the clock by hand.
//! All scheduling math works in whole seconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds in one hour, the period of the spawn cycle.
pub const HOUR_SECS: u64 = 3600;

/// Supplies the current unix time in seconds.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time source used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Hand-driven time source for tests and deterministic replays.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Seconds elapsed since the top of the hour for a unix timestamp.
pub fn secs_within_hour(ts: u64) -> u32 {
    (ts % HOUR_SECS) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_700_000_000);
        assert_eq!(clock.now(), 1_700_000_000);
        clock.advance(90);
        assert_eq!(clock.now(), 1_700_000_090);
        clock.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn secs_within_hour_wraps() {
        assert_eq!(secs_within_hour(3600), 0);
        assert_eq!(secs_within_hour(3725), 125);
        assert_eq!(secs_within_hour(0), 0);
    }
}
