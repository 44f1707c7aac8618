//! Observability: structured logging and metric names.

mod logging;
mod metrics;

pub use logging::{LOG_FILTER_ENV, LOG_FORMAT_ENV, LogFormat, LoggingConfig};
pub use metrics::{
    BLOCKING_TRUNCATED_TOTAL, CANDIDATES, RESOLUTIONS_TOTAL, TIE_BREAK_TOTAL, describe_metrics,
};

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global `tracing` subscriber.
///
/// Library code never calls this; binaries and tests that want output do.
/// Calling it again after a successful install is a no-op.
///
/// # Errors
///
/// Returns an error if another global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Ok(());
    }

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .with(config.filter)
            .try_init()
            .map_err(init_error)?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .with(config.filter)
            .try_init()
            .map_err(init_error)?,
    }

    let _ = LOGGING_INIT.set(());
    Ok(())
}

/// Installs the subscriber configured by the environment.
///
/// # Errors
///
/// See [`init_logging`].
pub fn init_logging_from_env() -> Result<()> {
    init_logging(LoggingConfig::from_env())
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "init_logging".to_string(),
        cause: e.to_string(),
    }
}
