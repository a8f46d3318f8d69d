//! Retry with exponential backoff for collaborator calls.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tracing::warn;

use crate::application::clock::Clock;
use crate::application::collaborators::CollaboratorError;

const SOURCE: &str = "application::retry";
const METRIC_RETRY: &str = "rotativa_retry_total";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_multiplier: if backoff_multiplier.is_finite() && backoff_multiplier >= 1.0 {
                backoff_multiplier
            } else {
                1.0
            },
            max_delay,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts failures so far (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), 2.0, Duration::from_secs(10))
    }
}

impl From<&crate::config::RetrySettings> for RetryPolicy {
    fn from(settings: &crate::config::RetrySettings) -> Self {
        Self::new(
            settings.max_attempts.get(),
            settings.base_delay,
            settings.backoff_multiplier,
            settings.max_delay,
        )
    }
}

/// Whole-cycle backoff: a fixed delay between attempts.
impl From<&crate::config::SchedulerSettings> for RetryPolicy {
    fn from(settings: &crate::config::SchedulerSettings) -> Self {
        Self::new(
            settings.cycle_retry_attempts.get(),
            settings.cycle_retry_delay,
            1.0,
            settings.cycle_retry_delay,
        )
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy's attempts are used up.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    operation: &'static str,
    mut op: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    target = SOURCE,
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                counter!(METRIC_RETRY, "operation" => operation).increment(1);
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
