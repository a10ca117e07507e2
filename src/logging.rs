//! Tracing setup and the span macros used across job execution.
//!
//! The library never installs a subscriber on its own; hosts call
//! [`init_tracing`] or [`init_tracing_json`] once at startup. `RUST_LOG`
//! overrides the default `info` filter.

use std::sync::Once;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn install(format: Format) {
    INIT.call_once(|| {
        // Analyzer spans close with their busy/idle timings.
        let base = fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_names(true);

        // A host process may already own the global subscriber.
        let installed = match format {
            Format::Text => tracing_subscriber::registry()
                .with(env_filter())
                .with(base.with_file(true).with_line_number(true))
                .try_init(),
            Format::Json => tracing_subscriber::registry()
                .with(env_filter())
                .with(base.json().with_current_span(true).with_span_list(false))
                .try_init(),
        };
        if installed.is_ok() {
            info!(format = ?format, "Ancalagon tracing initialized");
        }
    });
}

/// Human-readable output. Subsequent calls are ignored.
pub fn init_tracing() {
    install(Format::Text);
}

/// One JSON object per event, carrying the enclosing job/analyzer span.
pub fn init_tracing_json() {
    install(Format::Json);
}

/// Span covering one job from target resolution to aggregation.
#[macro_export]
macro_rules! job_span {
    ($job_id:expr) => {
        tracing::info_span!("job", job_id = %$job_id)
    };
    ($job_id:expr, $($field:tt)*) => {
        tracing::info_span!("job", job_id = %$job_id, $($field)*)
    };
}

/// Span covering one analyzer run inside a job.
#[macro_export]
macro_rules! analyzer_span {
    ($job_id:expr, $analyzer:expr) => {
        tracing::info_span!("analyzer", job_id = %$job_id, analyzer = %$analyzer)
    };
}
