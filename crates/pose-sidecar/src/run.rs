//! Foreground entry point: load configuration, start the worker, then stop it
//! when the host asks the sidecar to exit.

use std::io;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::info;

use pose_sidecar_config::{Config, WorkerConfig};

use crate::error::SupervisorError;
use crate::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
use crate::status::{StatusReporter, StructuredStatusReporter};
use crate::supervisor::{StartOutcome, StopOutcome, Supervisor};
use crate::telemetry::{self, TelemetryError};

const RUN_TARGET: &str = "pose_sidecar::run";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the sidecar configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Errors surfaced while running the sidecar in the foreground.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The async runtime could not be built.
    #[error("failed to build the async runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Starting or stopping the worker failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// The shutdown listener task could not be joined.
    #[error("shutdown listener failed: {source}")]
    Listener {
        /// Join failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl From<Arc<OrthoError>> for RunError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for RunError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<ShutdownError> for RunError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

/// Runs the sidecar with system collaborators until a termination signal.
pub fn run_sidecar() -> Result<(), RunError> {
    let shutdown = SystemShutdownSignal::install()?;
    run_with(
        &SystemConfigLoader,
        Arc::new(StructuredStatusReporter::new()),
        Arc::new(shutdown),
    )
}

/// Runs the sidecar with the supplied collaborators.
pub fn run_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn StatusReporter>,
    shutdown: Arc<dyn ShutdownSignal>,
) -> Result<(), RunError> {
    let config = loader.load()?;
    telemetry::initialise(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .map_err(|source| RunError::Runtime { source })?;
    let result = runtime.block_on(serve(&config, reporter, shutdown));
    // The listener may still be parked in a blocking wait when start failed.
    runtime.shutdown_background();
    result
}

async fn serve(
    config: &Config,
    reporter: Arc<dyn StatusReporter>,
    shutdown: Arc<dyn ShutdownSignal>,
) -> Result<(), RunError> {
    let worker = WorkerConfig::from_config(config).map_err(SupervisorError::from)?;
    let supervisor = Supervisor::system(config, reporter)?;
    let listener = tokio::task::spawn_blocking(move || shutdown.wait());

    // Running the binary is itself the on-demand request.
    let started = match supervisor.host_ready(worker.clone()).await? {
        Some(outcome) => outcome,
        None => supervisor.start(worker).await?,
    };
    if let StartOutcome::Launched(group) = started {
        info!(target: RUN_TARGET, group = %group, "worker running; waiting for shutdown");
    }

    listener
        .await
        .map_err(|source| RunError::Listener { source })??;
    match supervisor.stop().await? {
        StopOutcome::Stopped(result) => {
            info!(target: RUN_TARGET, result = ?result, "worker stopped");
        }
        StopOutcome::NotRunning => {
            info!(target: RUN_TARGET, "worker was not running at shutdown");
        }
    }
    Ok(())
}
