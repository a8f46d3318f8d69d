use std::sync::Arc;

use apalis::prelude::Error as ApalisError;
use tokio::sync::Mutex;

use crate::application::{
    clock::Clock, pipeline::CycleOrchestrator, retention::RetentionSweeper, retry::RetryPolicy,
};

/// Held for the whole run of any job that touches the store, so a cycle and a sweep never
/// overlap.
pub type JobGate = Arc<Mutex<()>>;

pub fn job_gate() -> JobGate {
    Arc::new(Mutex::new(()))
}

/// Shared context for the generation cycle worker.
#[derive(Clone)]
pub struct CycleJobContext {
    pub orchestrator: Arc<CycleOrchestrator>,
    pub gate: JobGate,
    /// Backoff applied when a whole cycle fails on storage errors.
    pub backoff: RetryPolicy,
    pub clock: Arc<dyn Clock>,
}

/// Shared context for the retention sweep worker.
#[derive(Clone)]
pub struct SweepJobContext {
    pub sweeper: Arc<RetentionSweeper>,
    pub gate: JobGate,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
