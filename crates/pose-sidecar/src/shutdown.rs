//! Waits for the host to ask the sidecar to exit.

use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

const SHUTDOWN_TARGET: &str = "pose_sidecar::shutdown";

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for a termination signal.
///
/// Handlers are installed on construction so a signal arriving while the
/// worker is still starting is not lost.
pub struct SystemShutdownSignal {
    signals: std::sync::Mutex<Signals>,
}

impl SystemShutdownSignal {
    /// Installs handlers for SIGTERM, SIGINT, SIGQUIT and SIGHUP.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        Ok(Self {
            signals: std::sync::Mutex::new(signals),
        })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = self
            .signals
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(signal) = signals.forever().next() {
            info!(target: SHUTDOWN_TARGET, signal, "shutdown signal received");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SystemShutdownSignal {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("SystemShutdownSignal").finish_non_exhaustive()
    }
}
