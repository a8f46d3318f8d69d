mod context;
mod cycle;
mod sweep;

use apalis::prelude::{Monitor, WorkerBuilder, WorkerFactoryFn};
use apalis_cron::{CronStream, Schedule};
use tracing::error;

const SOURCE: &str = "application::jobs";

pub use context::{CycleJobContext, JobGate, SweepJobContext, job_failed, job_gate};
pub use cycle::{
    MAX_CYCLE_INTERVAL_MINUTES, MIN_CYCLE_INTERVAL_MINUTES, RunCycleJob, cycle_schedule,
    process_run_cycle_job, run_cycle_with_backoff,
};
pub use sweep::{
    DEFAULT_SWEEP_CRON, RetentionSweepJob, process_retention_sweep_job, sweep_schedule,
};

/// Start the cron workers. The cycle worker is registered only when a cycle context is
/// supplied; the sweep worker always runs.
pub fn spawn_job_monitor(
    cycle: Option<(CycleJobContext, Schedule)>,
    sweep: SweepJobContext,
    sweep_schedule: Schedule,
) -> tokio::task::JoinHandle<()> {
    let sweep_worker = WorkerBuilder::new("retention-sweep-worker")
        .data(sweep)
        .backend(CronStream::new(sweep_schedule))
        .build_fn(process_retention_sweep_job);

    let mut monitor = Monitor::new().register(sweep_worker);

    if let Some((context, schedule)) = cycle {
        let cycle_worker = WorkerBuilder::new("generation-cycle-worker")
            .data(context)
            .backend(CronStream::new(schedule))
            .build_fn(process_run_cycle_job);
        monitor = monitor.register(cycle_worker);
    }

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(target = SOURCE, error = %err, "job monitor stopped");
        }
    })
}
