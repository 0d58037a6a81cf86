//! Structured logging with tracing.

use tracing::{info, info_span, Instrument};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` overrides the default
    /// `info` filter.
    pub fn init() {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .init()
    }

    /// Emits one run-lifecycle event inside a dedicated span.
    #[inline]
    pub async fn log_event(event_type: &str, detail: &str) {
        let span = info_span!("run_event", event_type = event_type);
        async {
            info!(detail = detail, "Run event");
        }
        .instrument(span)
        .await
    }
}
