//! Cron job running retention maintenance.

use std::str::FromStr;

use apalis::prelude::{Data, Error as ApalisError};
use apalis_cron::Schedule;
use tracing::info;

use crate::infra::error::InfraError;

use super::context::{SweepJobContext, job_failed};

const SOURCE: &str = "application::jobs::sweep";

/// Daily at 03:00 UTC.
pub const DEFAULT_SWEEP_CRON: &str = "0 0 3 * * *";

/// Marker struct for the cron-triggered sweep job.
#[derive(Default, Debug, Clone)]
pub struct RetentionSweepJob;

impl From<chrono::DateTime<chrono::Utc>> for RetentionSweepJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

pub async fn process_retention_sweep_job(
    _job: RetentionSweepJob,
    ctx: Data<SweepJobContext>,
) -> Result<(), ApalisError> {
    let _exclusive = ctx.gate.lock().await;
    let report = ctx.sweeper.run_maintenance().await.map_err(job_failed)?;
    info!(
        target = SOURCE,
        swept = report.sweep.total_deleted(),
        reclaimed_bytes = report.sweep.reclaimed_bytes(),
        history_pruned = report.history_pruned,
        usage_pruned = report.usage_pruned,
        "scheduled maintenance completed"
    );
    Ok(())
}

pub fn sweep_schedule(expression: &str) -> Result<Schedule, InfraError> {
    Schedule::from_str(expression)
        .map_err(|err| InfraError::scheduler(format!("invalid cron `{expression}`: {err}")))
}
