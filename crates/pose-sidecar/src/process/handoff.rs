//! The handoff record through which the wrapper publishes the worker's group.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::PROCESS_TARGET;
use super::group::ProcessGroupId;

/// Plain-text file holding the worker's process-group id.
///
/// The record is removed before each launch, so a value left behind by a
/// killed supervisor is never trusted, and again at the end of every shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRecord {
    path: PathBuf,
}

impl HandoffRecord {
    /// Record stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the record.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Reads and validates the published group id.
    pub fn read(&self) -> Result<ProcessGroupId, HandoffError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| HandoffError::Read {
            path: self.path.clone(),
            source,
        })?;
        parse_group(&contents)
    }

    /// Deletes the record, tolerating its absence.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(
                    target: PROCESS_TARGET,
                    file = %self.path.display(),
                    "handoff record removed"
                );
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    file = %self.path.display(),
                    error = %error,
                    "failed to remove handoff record"
                );
            }
        }
    }

    /// Whether the record is present on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// Errors raised while reading the handoff record.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The record could not be read.
    #[error("failed to read handoff record '{path}': {source}")]
    Read {
        /// Record path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The record did not contain an integer.
    #[error("handoff record is malformed: {contents:?}")]
    Malformed {
        /// Trimmed record contents.
        contents: String,
    },
    /// The record named a group that must never be signalled.
    #[error("handoff record names reserved process group {value}")]
    Reserved {
        /// Rejected value.
        value: i32,
    },
}

fn parse_group(contents: &str) -> Result<ProcessGroupId, HandoffError> {
    let trimmed = contents.trim();
    let value = trimmed
        .parse::<i32>()
        .map_err(|_| HandoffError::Malformed {
            contents: trimmed.to_owned(),
        })?;
    ProcessGroupId::new(value).ok_or(HandoffError::Reserved { value })
}
