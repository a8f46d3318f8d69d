//! Time source injected into every component that reads the wall clock or sleeps.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::infra::lock::mutex_lock;

const SOURCE: &str = "application::clock";

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    async fn sleep(&self, duration: Duration);
}

/// `at + by`, clamped to the latest representable instant.
pub fn saturating_after(at: OffsetDateTime, by: Duration) -> OffsetDateTime {
    time::Duration::try_from(by)
        .ok()
        .and_then(|by| at.checked_add(by))
        .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
}

/// `at - by`, clamped to the earliest representable instant.
pub fn saturating_before(at: OffsetDateTime, by: Duration) -> OffsetDateTime {
    time::Duration::try_from(by)
        .ok()
        .and_then(|by| at.checked_sub(by))
        .unwrap_or_else(|| PrimitiveDateTime::MIN.assume_utc())
}

/// Wall clock backed by tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock: `sleep` returns immediately and advances the current time.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
            slept: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = mutex_lock(&self.now, SOURCE, "advance");
        *now += by;
    }

    pub fn set(&self, at: OffsetDateTime) {
        *mutex_lock(&self.now, SOURCE, "set") = at;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        mutex_lock(&self.slept, SOURCE, "sleeps").clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *mutex_lock(&self.now, SOURCE, "now")
    }

    async fn sleep(&self, duration: Duration) {
        mutex_lock(&self.slept, SOURCE, "sleep").push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[tokio::test]
    async fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new(datetime!(2026-01-01 00:00 UTC));
        clock.sleep(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), datetime!(2026-01-01 00:01:30 UTC));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(90)]);
    }

    #[test]
    fn offsets_clamp_at_the_representable_range() {
        let at = datetime!(2026-01-01 00:00 UTC);
        let huge = Duration::from_secs(400_000 * 365 * 86_400);

        assert_eq!(saturating_after(at, huge), PrimitiveDateTime::MAX.assume_utc());
        assert_eq!(saturating_before(at, huge), PrimitiveDateTime::MIN.assume_utc());
        assert_eq!(saturating_after(at, Duration::MAX), PrimitiveDateTime::MAX.assume_utc());
        assert_eq!(
            saturating_before(at, Duration::from_secs(86_400)),
            datetime!(2025-12-31 00:00 UTC)
        );
    }
}
