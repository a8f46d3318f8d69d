//! Cron job running one generation cycle.

use std::str::FromStr;

use apalis::prelude::{Data, Error as ApalisError};
use apalis_cron::Schedule;
use tracing::{info, warn};

use crate::application::pipeline::{CycleError, CycleReport};
use crate::infra::error::InfraError;

use super::context::{CycleJobContext, job_failed};

const SOURCE: &str = "application::jobs::cycle";

pub const MIN_CYCLE_INTERVAL_MINUTES: u32 = 30;
pub const MAX_CYCLE_INTERVAL_MINUTES: u32 = 24 * 60;

/// Marker struct for the cron-triggered cycle job.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct RunCycleJob;

impl From<chrono::DateTime<chrono::Utc>> for RunCycleJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

pub async fn process_run_cycle_job(
    _job: RunCycleJob,
    ctx: Data<CycleJobContext>,
) -> Result<(), ApalisError> {
    let _exclusive = ctx.gate.lock().await;
    run_cycle_with_backoff(&ctx)
        .await
        .map(|_| ())
        .map_err(job_failed)
}

/// Run a cycle, retrying the whole cycle with the context's backoff when it aborts.
pub async fn run_cycle_with_backoff(ctx: &CycleJobContext) -> Result<CycleReport, CycleError> {
    let mut attempt = 1;
    loop {
        match ctx.orchestrator.run_cycle().await {
            Ok(report) => {
                info!(
                    target = SOURCE,
                    attempt,
                    processed = report.processed,
                    "scheduled cycle completed"
                );
                return Ok(report);
            }
            Err(err) if attempt < ctx.backoff.max_attempts => {
                let delay = ctx.backoff.delay_after(attempt);
                warn!(
                    target = SOURCE,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "cycle aborted; retrying after backoff"
                );
                ctx.clock.sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Cron schedule firing every `interval_minutes`. Intervals below an hour must be between
/// 30 and 59 minutes; longer intervals must be whole hours, up to one day.
pub fn cycle_schedule(interval_minutes: u32) -> Result<Schedule, InfraError> {
    let expression = cycle_cron_expression(interval_minutes)?;
    Schedule::from_str(&expression)
        .map_err(|err| InfraError::scheduler(format!("invalid cron `{expression}`: {err}")))
}

fn cycle_cron_expression(interval_minutes: u32) -> Result<String, InfraError> {
    if !(MIN_CYCLE_INTERVAL_MINUTES..=MAX_CYCLE_INTERVAL_MINUTES).contains(&interval_minutes) {
        return Err(InfraError::scheduler(format!(
            "cycle interval must be between {MIN_CYCLE_INTERVAL_MINUTES} and \
             {MAX_CYCLE_INTERVAL_MINUTES} minutes, got {interval_minutes}"
        )));
    }
    match interval_minutes {
        MAX_CYCLE_INTERVAL_MINUTES => Ok("0 0 0 * * *".to_string()),
        minutes if minutes < 60 => Ok(format!("0 */{minutes} * * * *")),
        minutes if minutes % 60 == 0 => Ok(format!("0 0 */{} * * *", minutes / 60)),
        minutes => Err(InfraError::scheduler(format!(
            "cycle interval of {minutes} minutes is not a whole number of hours"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expressions_cover_minutes_hours_and_days() {
        assert_eq!(cycle_cron_expression(30).expect("30m"), "0 */30 * * * *");
        assert_eq!(cycle_cron_expression(120).expect("2h"), "0 0 */2 * * *");
        assert_eq!(cycle_cron_expression(1440).expect("1d"), "0 0 0 * * *");
    }

    #[test]
    fn out_of_range_or_ragged_intervals_are_rejected() {
        assert!(cycle_schedule(15).is_err());
        assert!(cycle_schedule(2000).is_err());
        assert!(cycle_schedule(90).is_err());
    }

    #[test]
    fn schedule_parses_correctly() {
        let schedule = cycle_schedule(120).expect("schedule");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }
}
