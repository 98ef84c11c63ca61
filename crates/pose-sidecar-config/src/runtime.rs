//! Derives runtime artefact paths shared by the supervisor and its wrapper.
//!
//! The runtime directory houses the handoff record written by the launch
//! wrapper, the worker's redirected output and the installer log. The
//! supervisor and the wrapper script must agree on these locations, so they
//! are derived in one place.

use std::fs::DirBuilder;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

const HANDOFF_FILE: &str = "pose-sidecar.pgid";
const WORKER_LOG_FILE: &str = "pose-sidecar-worker.log";
const INSTALL_LOG_FILE: &str = "pose-sidecar-install.log";

/// Canonical paths for runtime artefacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    handoff_path: PathBuf,
    worker_log_path: PathBuf,
    install_log_path: PathBuf,
}

impl RuntimePaths {
    /// Derives runtime paths from the shared configuration, creating the
    /// directory with owner-only permissions.
    pub fn from_config(config: &Config) -> Result<Self, RuntimePathsError> {
        Self::in_directory(config.runtime_dir().into_std_path_buf())
    }

    /// Derives runtime paths under an explicit directory, creating it.
    pub fn in_directory(runtime_dir: impl Into<PathBuf>) -> Result<Self, RuntimePathsError> {
        let runtime_dir = runtime_dir.into();
        if runtime_dir.as_os_str().is_empty() {
            return Err(RuntimePathsError::EmptyRuntimeDirectory);
        }
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(&runtime_dir)
            .map_err(|source| RuntimePathsError::RuntimeDirectory {
                path: runtime_dir.clone(),
                source,
            })?;
        Ok(Self {
            handoff_path: runtime_dir.join(HANDOFF_FILE),
            worker_log_path: runtime_dir.join(WORKER_LOG_FILE),
            install_log_path: runtime_dir.join(INSTALL_LOG_FILE),
            runtime_dir,
        })
    }

    /// Directory holding runtime artefacts.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        self.runtime_dir.as_path()
    }

    /// Handoff record carrying the worker's process-group id.
    #[must_use]
    pub fn handoff_path(&self) -> &Path {
        self.handoff_path.as_path()
    }

    /// Log file receiving all of the worker's output.
    #[must_use]
    pub fn worker_log_path(&self) -> &Path {
        self.worker_log_path.as_path()
    }

    /// Log file receiving the package installer's output.
    #[must_use]
    pub fn install_log_path(&self) -> &Path {
        self.install_log_path.as_path()
    }
}

/// Errors raised while deriving runtime paths.
#[derive(Debug, Error)]
pub enum RuntimePathsError {
    /// The configured runtime directory was empty.
    #[error("runtime directory must not be empty")]
    EmptyRuntimeDirectory,
    /// Creating the runtime directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    RuntimeDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
