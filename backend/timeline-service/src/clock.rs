//! Process-wide monotonic timestamps
//!
//! Every timestamp this service writes comes from [`now`]. Values are
//! truncated to microseconds (what Postgres `timestamptz` stores) and strictly
//! increase, so a record read back from the database equals the one cached at
//! write time, and composite column-store row keys never collide.

use chrono::{DateTime, Timelike, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub const fn new() -> Self {
        Self {
            last_micros: AtomicI64::new(0),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut last = self.last_micros.load(Ordering::Relaxed);
        loop {
            let next = wall.max(last + 1);
            match self.last_micros.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return from_micros(next).unwrap_or_else(Utc::now),
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

static CLOCK: MonotonicClock = MonotonicClock::new();

/// Strictly increasing, microsecond-precision current time
pub fn now() -> DateTime<Utc> {
    CLOCK.now()
}

pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Drop sub-microsecond precision
pub fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(ts.nanosecond() / 1_000 * 1_000)
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut previous = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_microsecond_precision() {
        let ts = now();
        assert_eq!(ts, truncate_micros(ts));
    }

    #[test]
    fn test_truncate_drops_nanoseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(truncate_micros(ts).nanosecond(), 123_456_000);
    }
}
