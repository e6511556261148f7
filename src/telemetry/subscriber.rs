//! Tracing subscriber setup
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else the configured level)
//!   └── Fmt Layer (pretty or JSON)
//! ```
//!
//! Spans created by [`SpanFactory`](super::SpanFactory) carry `trace_id` and
//! `span_id` fields, so every log line inside them can be correlated.

use super::TelemetryError;
use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber described by `config`
///
/// Fails if the filter does not parse or a global subscriber is already set.
///
/// # Example
///
/// ```no_run
/// use tsunagi::config::LoggingConfig;
/// use tsunagi::telemetry::init_subscriber;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// init_subscriber(&LoggingConfig::default())?;
/// tracing::info!("ready");
/// # Ok(())
/// # }
/// ```
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| TelemetryError::InvalidFilter(format!("{}: {}", config.level, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_line_number(true);
            tracing::subscriber::set_global_default(registry.with(fmt_layer))
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);
            tracing::subscriber::set_global_default(registry.with(fmt_layer))
        }
    };

    result.map_err(|e| {
        TelemetryError::SubscriberInit(format!(
            "Failed to set global subscriber (may already be initialized): {}",
            e
        ))
    })
}
