//! Minimum-interval rate limiting for external services.
//!
//! The last call time is persisted through [`RateLimitRepo`], so the interval also holds
//! across restarts. Store failures never block the caller: the limiter sleeps the full
//! interval and proceeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, histogram};
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::clock::Clock;
use crate::application::repos::RateLimitRepo;

const SOURCE: &str = "application::rate_limit";
const METRIC_WAIT_MS: &str = "rotativa_rate_limit_wait_ms";
const METRIC_STORE_ERROR: &str = "rotativa_rate_limit_store_error_total";

pub const SERVICE_GENERATION: &str = "generation";
pub const SERVICE_SEARCH: &str = "search";
pub const SERVICE_ASSET: &str = "asset";
pub const SERVICE_DISCOVERY: &str = "discovery";

/// Per-service minimum intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceLimits {
    intervals: HashMap<String, Duration>,
    fallback: Duration,
}

impl ServiceLimits {
    pub fn new(fallback: Duration) -> Self {
        Self {
            intervals: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, service: &str, interval: Duration) -> Self {
        self.intervals.insert(service.to_string(), interval);
        self
    }

    pub fn interval_for(&self, service: &str) -> Duration {
        self.intervals
            .get(service)
            .copied()
            .unwrap_or(self.fallback)
    }
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
            .with(SERVICE_GENERATION, Duration::from_secs(2))
            .with(SERVICE_SEARCH, Duration::from_secs(2))
            .with(SERVICE_ASSET, Duration::from_secs(5))
            .with(SERVICE_DISCOVERY, Duration::from_secs(1))
    }
}

impl From<&crate::config::RateLimitSettings> for ServiceLimits {
    fn from(settings: &crate::config::RateLimitSettings) -> Self {
        Self::new(settings.fallback_interval)
            .with(SERVICE_GENERATION, settings.generation_interval)
            .with(SERVICE_SEARCH, settings.search_interval)
            .with(SERVICE_ASSET, settings.asset_interval)
            .with(SERVICE_DISCOVERY, settings.discovery_interval)
    }
}

pub struct RateLimiter {
    repo: Arc<dyn RateLimitRepo>,
    clock: Arc<dyn Clock>,
    limits: ServiceLimits,
    gates: DashMap<String, Arc<Mutex<()>>>,
}

impl RateLimiter {
    pub fn new(repo: Arc<dyn RateLimitRepo>, clock: Arc<dyn Clock>, limits: ServiceLimits) -> Self {
        Self {
            repo,
            clock,
            limits,
            gates: DashMap::new(),
        }
    }

    pub fn limits(&self) -> &ServiceLimits {
        &self.limits
    }

    /// Wait until the configured interval for `service` has elapsed since its last call.
    pub async fn acquire_service(&self, service: &str) -> Duration {
        self.acquire(service, self.limits.interval_for(service)).await
    }

    /// Wait until `min_interval` has elapsed since the last recorded call to `service`, then
    /// record the current time. Returns how long the caller was held back.
    pub async fn acquire(&self, service: &str, min_interval: Duration) -> Duration {
        let gate = self.gate(service);
        let _serialized = gate.lock().await;

        let mut waited = Duration::ZERO;
        let mut failed_open = false;

        match self.repo.last_request_at(service).await {
            Ok(Some(last)) => {
                waited = remaining_wait(last, self.clock.now(), min_interval);
                if !waited.is_zero() {
                    debug!(
                        target = SOURCE,
                        service,
                        wait_ms = waited.as_millis() as u64,
                        "rate limit wait"
                    );
                    self.clock.sleep(waited).await;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    target = SOURCE,
                    service,
                    error = %err,
                    "rate limit store unreadable; waiting full interval"
                );
                counter!(METRIC_STORE_ERROR, "service" => service.to_string()).increment(1);
                self.clock.sleep(min_interval).await;
                waited = min_interval;
                failed_open = true;
            }
        }

        if let Err(err) = self.repo.mark_request(service, self.clock.now()).await {
            warn!(
                target = SOURCE,
                service,
                error = %err,
                "rate limit store unwritable; waiting full interval"
            );
            counter!(METRIC_STORE_ERROR, "service" => service.to_string()).increment(1);
            if !failed_open {
                self.clock.sleep(min_interval).await;
                waited += min_interval;
            }
        }

        histogram!(METRIC_WAIT_MS, "service" => service.to_string())
            .record(waited.as_secs_f64() * 1000.0);
        waited
    }

    /// Add `calls` and `tokens` to today's usage tally for `service`. Failures are logged.
    pub async fn record_usage(&self, service: &str, calls: u64, tokens: u64) {
        let day = self.clock.now().to_offset(UtcOffset::UTC).date();
        if let Err(err) = self.repo.record_usage(service, day, calls, tokens).await {
            warn!(
                target = SOURCE,
                service,
                calls,
                tokens,
                error = %err,
                "failed to record service usage"
            );
        }
    }

    fn gate(&self, service: &str) -> Arc<Mutex<()>> {
        self.gates
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Remaining time before `min_interval` has passed since `last`. A `last` in the future
/// (clock moved backwards) costs a full interval.
fn remaining_wait(last: OffsetDateTime, now: OffsetDateTime, min_interval: Duration) -> Duration {
    let elapsed = now - last;
    if elapsed.is_negative() {
        return min_interval;
    }
    min_interval.saturating_sub(elapsed.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use time::Date;
    use time::macros::{date, datetime};

    use super::*;
    use crate::application::clock::ManualClock;
    use crate::application::repos::RepoError;
    use crate::domain::entities::UsageRecord;
    use crate::infra::memory::MemoryRepositories;

    struct BrokenStore;

    #[async_trait]
    impl RateLimitRepo for BrokenStore {
        async fn last_request_at(&self, _: &str) -> Result<Option<OffsetDateTime>, RepoError> {
            Err(RepoError::from_persistence("disk unavailable"))
        }

        async fn mark_request(&self, _: &str, _: OffsetDateTime) -> Result<(), RepoError> {
            Err(RepoError::from_persistence("disk unavailable"))
        }

        async fn record_usage(&self, _: &str, _: Date, _: u64, _: u64) -> Result<(), RepoError> {
            Err(RepoError::from_persistence("disk unavailable"))
        }

        async fn usage_for_day(&self, _: &str, _: Date) -> Result<Option<UsageRecord>, RepoError> {
            Err(RepoError::from_persistence("disk unavailable"))
        }

        async fn prune_usage(&self, _: Date) -> Result<u64, RepoError> {
            Err(RepoError::from_persistence("disk unavailable"))
        }
    }

    fn limiter(repo: Arc<dyn RateLimitRepo>, clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(repo, clock, ServiceLimits::default())
    }

    #[tokio::test]
    async fn back_to_back_calls_are_spaced_by_the_interval() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 08:00 UTC)));
        let repos = Arc::new(MemoryRepositories::new());
        let limiter = limiter(repos.clone(), clock.clone());

        assert_eq!(limiter.acquire("svc", Duration::from_secs(2)).await, Duration::ZERO);
        let first = repos.last_request_at("svc").await.expect("read").expect("stored");

        assert_eq!(
            limiter.acquire("svc", Duration::from_secs(2)).await,
            Duration::from_secs(2)
        );
        let second = repos.last_request_at("svc").await.expect("read").expect("stored");

        assert!(second - first >= time::Duration::seconds(2));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn only_the_remainder_is_waited() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 08:00 UTC)));
        let repos = Arc::new(MemoryRepositories::new());
        let limiter = limiter(repos, clock.clone());

        limiter.acquire("svc", Duration::from_secs(2)).await;
        clock.advance(Duration::from_millis(1500));
        assert_eq!(
            limiter.acquire("svc", Duration::from_secs(2)).await,
            Duration::from_millis(500)
        );

        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.acquire("svc", Duration::from_secs(2)).await, Duration::ZERO);
    }

    #[tokio::test]
    async fn interval_survives_a_new_limiter_instance() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 08:00 UTC)));
        let repos = Arc::new(MemoryRepositories::new());

        limiter(repos.clone(), clock.clone())
            .acquire_service(SERVICE_ASSET)
            .await;
        let restarted = limiter(repos, clock.clone());
        assert_eq!(
            restarted.acquire_service(SERVICE_ASSET).await,
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn store_failure_fails_open_after_full_interval() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 08:00 UTC)));
        let limiter = limiter(Arc::new(BrokenStore), clock.clone());

        let waited = limiter.acquire("svc", Duration::from_secs(3)).await;

        assert_eq!(waited, Duration::from_secs(3));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
        limiter.record_usage("svc", 1, 10).await;
    }

    #[tokio::test]
    async fn usage_is_tallied_per_utc_day() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-04-01 23:59 UTC)));
        let repos = Arc::new(MemoryRepositories::new());
        let limiter = limiter(repos.clone(), clock.clone());

        limiter.record_usage(SERVICE_GENERATION, 1, 300).await;
        limiter.record_usage(SERVICE_GENERATION, 1, 200).await;
        clock.advance(Duration::from_secs(120));
        limiter.record_usage(SERVICE_GENERATION, 1, 50).await;

        let first = repos
            .usage_for_day(SERVICE_GENERATION, date!(2026 - 04 - 01))
            .await
            .expect("read")
            .expect("row");
        assert_eq!((first.calls, first.tokens), (2, 500));
        let second = repos
            .usage_for_day(SERVICE_GENERATION, date!(2026 - 04 - 02))
            .await
            .expect("read")
            .expect("row");
        assert_eq!((second.calls, second.tokens), (1, 50));
    }

    #[test]
    fn future_timestamp_costs_full_interval() {
        let now = datetime!(2026-04-01 08:00 UTC);
        let interval = Duration::from_secs(2);
        assert_eq!(
            remaining_wait(now + Duration::from_secs(30), now, interval),
            interval
        );
        assert_eq!(
            remaining_wait(now - Duration::from_secs(30), now, interval),
            Duration::ZERO
        );
    }
}
