/// Time source for day bucketing.
///
/// Batches are keyed by the epoch-seconds of UTC midnight. The clock is
/// injected so rollover can be driven deterministically in tests.
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

pub const MILLIS_PER_DAY: i64 = 86_400_000;
pub const SECONDS_PER_DAY: i64 = 86_400;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Epoch-seconds of the UTC midnight starting the day that contains `millis`.
pub fn utc_midnight(millis: i64) -> i64 {
    millis.div_euclid(MILLIS_PER_DAY) * SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_midnight_matches_chrono() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 12).unwrap();
        let midnight = utc_midnight(instant.timestamp_millis());
        let expected = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(midnight, expected.timestamp());
        assert_eq!(expected.hour(), 0);
    }

    #[test]
    fn test_midnight_boundaries() {
        assert_eq!(utc_midnight(0), 0);
        assert_eq!(utc_midnight(MILLIS_PER_DAY - 1), 0);
        assert_eq!(utc_midnight(MILLIS_PER_DAY), SECONDS_PER_DAY);
        // Before the epoch still floors to the start of that day
        assert_eq!(utc_midnight(-1), -SECONDS_PER_DAY);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(MILLIS_PER_DAY);
        assert_eq!(clock.now_millis(), 1_000 + MILLIS_PER_DAY);
        clock.set(5);
        assert_eq!(clock.now_millis(), 5);
    }
}
