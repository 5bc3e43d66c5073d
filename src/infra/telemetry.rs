use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::live::METRIC_LIVE_FETCH_MS;
use crate::application::mutations::{METRIC_OPTIMISTIC_APPLY, METRIC_OPTIMISTIC_ROLLBACK};
use crate::application::reconcile::METRIC_HANDOFF;
use crate::application::snapshot::METRIC_SNAPSHOT_FALLBACK;
use crate::cache::{METRIC_STORE_EVICT, METRIC_STORE_WRITE};
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_STORE_WRITE,
            Unit::Count,
            "Total number of entity store writes by operation."
        );
        describe_counter!(
            METRIC_STORE_EVICT,
            Unit::Count,
            "Total number of cached collections evicted, by reason."
        );
        describe_counter!(
            METRIC_HANDOFF,
            Unit::Count,
            "Total number of views switched from snapshot to live data."
        );
        describe_counter!(
            METRIC_SNAPSHOT_FALLBACK,
            Unit::Count,
            "Total number of snapshot reads degraded to an empty value."
        );
        describe_counter!(
            METRIC_OPTIMISTIC_APPLY,
            Unit::Count,
            "Total number of optimistic writes applied ahead of the backend."
        );
        describe_counter!(
            METRIC_OPTIMISTIC_ROLLBACK,
            Unit::Count,
            "Total number of optimistic writes rolled back after a failure."
        );
        describe_histogram!(
            METRIC_LIVE_FETCH_MS,
            Unit::Milliseconds,
            "Live backend fetch latency in milliseconds."
        );
    });
}
