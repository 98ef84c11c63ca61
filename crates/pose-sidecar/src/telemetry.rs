//! Installs the process-wide `tracing` subscriber for the sidecar.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use pose_sidecar_config::{Config, LogFormat};

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();

/// Proof that telemetry is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter '{filter}': {reason}")]
    Filter {
        /// Rejected expression.
        filter: String,
        /// Parser message.
        reason: String,
    },
    /// Another global subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls return a handle without touching global state, even when their
/// configuration differs.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    SUBSCRIBER_INSTALLED
        .get_or_try_init(|| install(config))
        .map(|()| TelemetryHandle)
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let subscriber = build_subscriber(config)?;
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

fn build_subscriber(
    config: &Config,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let filter =
        EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            reason: error.to_string(),
        })?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    Ok(match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}
