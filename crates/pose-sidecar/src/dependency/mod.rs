//! Verifies and installs the worker's runtime prerequisites.
//!
//! Runtime resolution prefers the project-local isolated environment over the
//! system-wide runtime. The library check imports the worker's library and
//! prints a marker; both the exit code and the marker must be present.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use thiserror::Error;
use tracing::{debug, info, warn};

use pose_sidecar_config::{RuntimePaths, SupervisorTimings, Toolchain};

use crate::process::{CommandOutput, CommandRunner, Invocation};

mod install;

pub use install::{InstallOutcome, InstallationJob};

pub(crate) const DEPENDENCY_TARGET: &str = "pose_sidecar::dependency";

/// Marker printed by the library probe on a successful import.
pub const LIBRARY_MARKER: &str = "POSE_SIDECAR_OK";

/// Errors raised by dependency checks and installation.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// A probe invocation kept failing to run.
    #[error("probe '{command}' failed after {attempts} attempt(s): {source}")]
    Probe {
        /// Rendered probe command.
        command: String,
        /// Attempts made.
        attempts: u32,
        /// Last invocation error.
        #[source]
        source: io::Error,
    },
    /// Installation failed; the reason is operator-facing.
    #[error("installation failed: {reason}")]
    InstallFailed {
        /// Failure description.
        reason: String,
    },
    /// A background task could not be joined.
    #[error("dependency task failed: {source}")]
    Task {
        /// Join failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Checks and installs the worker's runtime and library.
pub struct DependencyResolver {
    runner: Arc<dyn CommandRunner>,
    toolchain: Toolchain,
    timings: SupervisorTimings,
    install_log: PathBuf,
    installing: AtomicBool,
}

impl DependencyResolver {
    /// Builds a resolver running its probes through `runner`.
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        toolchain: Toolchain,
        paths: &RuntimePaths,
        timings: SupervisorTimings,
    ) -> Self {
        Self {
            runner,
            toolchain,
            timings,
            install_log: paths.install_log_path().to_path_buf(),
            installing: AtomicBool::new(false),
        }
    }

    /// Toolchain the resolver checks.
    #[must_use]
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Runtime candidates in preference order.
    #[must_use]
    pub fn runtime_candidates(&self) -> Vec<PathBuf> {
        vec![
            self.toolchain.venv_runtime(),
            self.toolchain.system_runtime().to_path_buf(),
        ]
    }

    /// Locates a working runtime, preferring the isolated environment.
    ///
    /// Returns `Ok(None)` when no candidate answers the version probe.
    pub async fn check_runtime(&self) -> Result<Option<PathBuf>, DependencyError> {
        let venv_runtime = self.toolchain.venv_runtime();
        if venv_runtime.exists() && self.probe_runtime(&venv_runtime).await? {
            debug!(
                target: DEPENDENCY_TARGET,
                runtime = %venv_runtime.display(),
                "using isolated environment runtime"
            );
            return Ok(Some(venv_runtime));
        }
        let system_runtime = self.toolchain.system_runtime().to_path_buf();
        if self.probe_runtime(&system_runtime).await? {
            debug!(
                target: DEPENDENCY_TARGET,
                runtime = %system_runtime.display(),
                "using system runtime"
            );
            return Ok(Some(system_runtime));
        }
        Ok(None)
    }

    /// Whether `runtime` can import the configured library.
    pub async fn check_library(&self, runtime: &Path) -> Result<bool, DependencyError> {
        let library = self.toolchain.library();
        let invocation = Invocation::new(runtime, self.timings.command_timeout)
            .arg("-c")
            .arg(format!("import {library}; print('{LIBRARY_MARKER}')"));
        let present = match self.run_probe(&invocation).await? {
            Some(output) => output.success() && output.stdout.contains(LIBRARY_MARKER),
            None => false,
        };
        info!(
            target: DEPENDENCY_TARGET,
            runtime = %runtime.display(),
            library,
            present,
            "library check"
        );
        Ok(present)
    }

    async fn probe_runtime(&self, runtime: &Path) -> Result<bool, DependencyError> {
        let invocation = Invocation::new(runtime, self.timings.command_timeout).arg("--version");
        let found = self
            .run_probe(&invocation)
            .await?
            .is_some_and(|output| output.success());
        debug!(
            target: DEPENDENCY_TARGET,
            runtime = %runtime.display(),
            found,
            "runtime probe"
        );
        Ok(found)
    }

    /// Runs a probe, retrying invocations that fail to run.
    ///
    /// A missing program yields `Ok(None)` without retrying.
    async fn run_probe(
        &self,
        invocation: &Invocation,
    ) -> Result<Option<CommandOutput>, DependencyError> {
        let attempts = self.timings.probe_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match run_blocking(Arc::clone(&self.runner), invocation.clone()).await? {
                Ok(output) => return Ok(Some(output)),
                Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(error) => {
                    warn!(
                        target: DEPENDENCY_TARGET,
                        command = %invocation.display(),
                        attempt,
                        error = %error,
                        "probe invocation failed"
                    );
                    last_error = Some(error);
                }
            }
        }
        Err(DependencyError::Probe {
            command: invocation.display(),
            attempts,
            source: last_error.unwrap_or_else(|| io::Error::other("probe never ran")),
        })
    }
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DependencyResolver")
            .field("toolchain", &self.toolchain)
            .field("install_log", &self.install_log)
            .finish_non_exhaustive()
    }
}

/// Runs `invocation` on the blocking pool; the runner enforces its timeout.
pub(crate) async fn run_blocking(
    runner: Arc<dyn CommandRunner>,
    invocation: Invocation,
) -> Result<io::Result<CommandOutput>, DependencyError> {
    tokio::task::spawn_blocking(move || runner.run(&invocation))
        .await
        .map_err(|source| DependencyError::Task { source })
}
