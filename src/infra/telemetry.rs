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
/// Events are written to stderr.
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "printrelay_dispatch_attempts_total",
            Unit::Count,
            "Render attempts made against any target."
        );
        describe_counter!(
            "printrelay_dispatch_failures_total",
            Unit::Count,
            "Render attempts that failed and moved on to the next target."
        );
        describe_counter!(
            "printrelay_dispatch_exhausted_total",
            Unit::Count,
            "Jobs that failed on every target or ran out of time."
        );
        describe_histogram!(
            "printrelay_render_ms",
            Unit::Milliseconds,
            "Successful render latency in milliseconds."
        );
        describe_counter!(
            "printrelay_heartbeat_probes_total",
            Unit::Count,
            "Heartbeat probes sent, labelled by outcome."
        );
    });
}
