use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names::{
    METRIC_CACHE_EVICTED, METRIC_CACHE_STALE_COMPLETION, METRIC_FETCH_MS,
    METRIC_INVALIDATE_MS, METRIC_INVALIDATED_KEYS, METRIC_MUTATION_TOTAL, METRIC_QUERY_TOTAL,
    METRIC_QUEUE_LEN,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
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
            METRIC_QUERY_TOTAL,
            Unit::Count,
            "Queries by outcome: skip, hit, join, fetch or refetch."
        );
        describe_histogram!(
            METRIC_FETCH_MS,
            Unit::Milliseconds,
            "Latency of resource fetches issued by the cache."
        );
        describe_counter!(
            METRIC_CACHE_STALE_COMPLETION,
            Unit::Count,
            "Fetch completions discarded because a newer request already resolved."
        );
        describe_counter!(
            METRIC_CACHE_EVICTED,
            Unit::Count,
            "Cache entries evicted, by reason."
        );
        describe_counter!(
            METRIC_MUTATION_TOTAL,
            Unit::Count,
            "Mutations sent to the backend, by kind and result."
        );
        describe_gauge!(
            METRIC_QUEUE_LEN,
            Unit::Count,
            "Current number of pending invalidation events."
        );
        describe_counter!(
            METRIC_INVALIDATED_KEYS,
            Unit::Count,
            "Cache entries marked stale by invalidation."
        );
        describe_histogram!(
            METRIC_INVALIDATE_MS,
            Unit::Milliseconds,
            "Invalidation consumption latency in milliseconds."
        );
    });
}
