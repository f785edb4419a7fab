use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::stats::{
    METRIC_COALESCED, METRIC_LOCAL_EVICT, METRIC_LOCAL_HIT, METRIC_MISS, METRIC_POPULATE_MS,
    METRIC_RESPONSE_BYPASS, METRIC_SHARED_HIT, METRIC_STORE_ERROR,
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

/// Register descriptions for every cache metric. Safe to call more than once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_LOCAL_HIT,
            Unit::Count,
            "Lookups served from the in-process tier."
        );
        describe_counter!(
            METRIC_SHARED_HIT,
            Unit::Count,
            "Lookups served from the shared tier after a local miss."
        );
        describe_counter!(
            METRIC_MISS,
            Unit::Count,
            "Lookups that missed both tiers and ran the value factory."
        );
        describe_counter!(
            METRIC_COALESCED,
            Unit::Count,
            "Callers that awaited a population already in flight."
        );
        describe_counter!(
            METRIC_STORE_ERROR,
            Unit::Count,
            "Shared store read or write failures, labelled by op."
        );
        describe_counter!(
            METRIC_LOCAL_EVICT,
            Unit::Count,
            "Local tier evictions due to capacity."
        );
        describe_counter!(
            METRIC_RESPONSE_BYPASS,
            Unit::Count,
            "Requests passed through the response cache, labelled by reason."
        );
        describe_histogram!(
            METRIC_POPULATE_MS,
            Unit::Milliseconds,
            "Time spent producing and storing a value on a full miss."
        );
    });
}
