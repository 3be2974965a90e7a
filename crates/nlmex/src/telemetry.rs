//! Logging setup for binaries embedding the task core.
//!
//! Library code logs through the `log` facade and `tracing` spans. This
//! installs a `tracing-subscriber` registry and forwards `log` records into
//! it through `tracing-log`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::NlmexError;

/// Builds the filter from `RUST_LOG`, falling back to the configured
/// directives.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, NlmexError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| {
            NlmexError::Logging(format!("invalid filter '{}': {}", config.filter, e))
        }),
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), NlmexError> {
    let filter = build_filter(config)?;

    let fmt_layer = match config.format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| NlmexError::Logging(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| NlmexError::Logging(e.to_string()))?;

    Ok(())
}
