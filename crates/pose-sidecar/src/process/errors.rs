//! Errors raised while launching the worker.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::group::ProcessGroupId;

/// Failures of [`super::ProcessLauncher::launch`].
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A launch path could not be made absolute.
    #[error("failed to resolve launch path '{path}': {source}")]
    ResolvePath {
        /// Offending path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The isolating wrapper could not be created.
    #[error("failed to spawn the worker wrapper: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Neither the handoff record nor the wrapper yielded a usable group id.
    #[error("launcher id {launcher} cannot identify a process group")]
    NoProcessGroup {
        /// Wrapper process id.
        launcher: u32,
    },
    /// The worker exited before the post-launch liveness probe.
    #[error("worker in process group {group} exited during startup:\n{log_tail}")]
    DiedImmediately {
        /// Group the worker was launched into.
        group: ProcessGroupId,
        /// Trailing lines of the worker log.
        log_tail: String,
    },
}
