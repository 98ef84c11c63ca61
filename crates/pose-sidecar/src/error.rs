//! Errors surfaced by the supervisor's public operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use pose_sidecar_config::{ConfigError, RuntimePathsError};

use crate::dependency::DependencyError;
use crate::process::{LaunchError, ProcessGroupId};

/// Failures of [`crate::Supervisor`] operations.
///
/// Every variant is also reported as a [`crate::StatusEvent::Failed`] event.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Launch settings failed validation.
    #[error("invalid supervisor configuration: {source}")]
    Config {
        /// Validation failure.
        #[source]
        source: ConfigError,
    },
    /// The runtime directory could not be prepared.
    #[error(transparent)]
    RuntimePaths(#[from] RuntimePathsError),
    /// No runtime executable answered the version probe.
    #[error("no worker runtime found (searched {searched:?})")]
    RuntimeNotFound {
        /// Candidates probed.
        searched: Vec<PathBuf>,
    },
    /// The worker's library is missing and could not be installed now.
    #[error("required library '{library}' is missing")]
    DependencyMissing {
        /// Missing library.
        library: String,
    },
    /// A dependency probe kept failing to run.
    #[error("dependency probe failed: {source}")]
    DependencyProbe {
        /// Underlying probe failure.
        #[source]
        source: DependencyError,
    },
    /// Installing the worker's prerequisites failed.
    #[error("dependency installation failed: {reason}")]
    InstallFailed {
        /// Operator-facing description.
        reason: String,
    },
    /// The isolating wrapper could not be created.
    #[error("failed to spawn the worker: {source}")]
    SpawnFailed {
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// Launching failed before the worker could be tracked.
    #[error(transparent)]
    Launch(LaunchError),
    /// The worker exited before its post-launch liveness probe.
    #[error("worker exited during startup; log tail:\n{log_tail}")]
    ProcessDiedImmediately {
        /// Group the worker was launched into.
        group: ProcessGroupId,
        /// Trailing lines of the worker log.
        log_tail: String,
    },
    /// The worker survived every forceful signal; local state was reset.
    #[error(
        "process group {group} survived termination; operator intervention is required"
    )]
    TerminationIncomplete {
        /// Group that could not be terminated.
        group: ProcessGroupId,
    },
}

impl From<ConfigError> for SupervisorError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}

impl From<LaunchError> for SupervisorError {
    fn from(error: LaunchError) -> Self {
        match error {
            LaunchError::Spawn { source } => Self::SpawnFailed { source },
            LaunchError::DiedImmediately { group, log_tail } => {
                Self::ProcessDiedImmediately { group, log_tail }
            }
            other => Self::Launch(other),
        }
    }
}

impl From<DependencyError> for SupervisorError {
    fn from(error: DependencyError) -> Self {
        match error {
            DependencyError::InstallFailed { reason } => Self::InstallFailed { reason },
            other => Self::DependencyProbe { source: other },
        }
    }
}
