//! Tracing subscriber setup for the engine binary.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output shape of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for interactive runs.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    /// Pick the format from the environment: `RUST_ENV=production`
    /// selects JSON, anything else pretty output.
    pub fn from_env() -> Self {
        match std::env::var("RUST_ENV").as_deref() {
            Ok("production") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `default_directives`. Fails if a subscriber is
/// already installed.
pub fn init_logging(format: LogFormat, default_directives: &str) -> TelemetryResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init(),
    };
    result.map_err(|err| TelemetryError::LoggingInit(err.to_string()))
}
