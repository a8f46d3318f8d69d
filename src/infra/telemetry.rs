use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "rotativa_cache_hit_total",
            Unit::Count,
            "Total number of cache hits, labelled by domain."
        );
        describe_counter!(
            "rotativa_cache_miss_total",
            Unit::Count,
            "Total number of cache misses, labelled by domain and reason."
        );
        describe_counter!(
            "rotativa_cache_invalidate_total",
            Unit::Count,
            "Total number of cache entries flagged invalid."
        );
        describe_histogram!(
            "rotativa_rate_limit_wait_ms",
            Unit::Milliseconds,
            "Time spent waiting for a service's minimum interval."
        );
        describe_counter!(
            "rotativa_rate_limit_store_error_total",
            Unit::Count,
            "Rate limit store failures that caused a fail-open full-interval wait."
        );
        describe_counter!(
            "rotativa_retry_total",
            Unit::Count,
            "Collaborator calls retried after a transient failure."
        );
        describe_counter!(
            "rotativa_cycle_items_total",
            Unit::Count,
            "Cycle items by outcome (processed, rejected, errored, duplicate, deferred)."
        );
        describe_histogram!(
            "rotativa_cycle_ms",
            Unit::Milliseconds,
            "Wall-clock duration of a generation cycle."
        );
        describe_counter!(
            "rotativa_sweep_deleted_total",
            Unit::Count,
            "Expired cache entries removed by the retention sweeper, labelled by domain."
        );
        describe_counter!(
            "rotativa_sweep_reclaimed_bytes_total",
            Unit::Bytes,
            "Bytes of backing files removed by the retention sweeper."
        );
    });
}
