//! Discrete status events surfaced to the host application.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::process::ProcessGroupId;

const STATUS_TARGET: &str = "pose_sidecar::status";

/// Lifecycle events raised by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// No runtime executable could be located.
    RuntimeNotFound {
        /// Candidates that were probed.
        searched: Vec<PathBuf>,
    },
    /// The runtime is present but the worker's library is not.
    DependencyMissing {
        /// Library that failed to import.
        library: String,
    },
    /// An installation milestone was reached.
    InstallProgress {
        /// Coarse, monotonically non-decreasing percentage.
        percent: u8,
        /// Human-readable milestone description.
        message: String,
    },
    /// Installation finished.
    InstallComplete {
        /// Whether the library became importable.
        success: bool,
    },
    /// The worker was confirmed alive.
    Started {
        /// The worker's process group.
        process_group: ProcessGroupId,
    },
    /// The worker was stopped and bookkeeping reset.
    Stopped,
    /// An operation failed.
    Failed {
        /// Operator-facing failure description.
        reason: String,
    },
}

/// Observer trait used to surface status events to the host.
pub trait StatusReporter: Send + Sync {
    /// Invoked once per event, in emission order.
    fn report(&self, event: &StatusEvent);
}

impl<T> StatusReporter for Arc<T>
where
    T: StatusReporter + ?Sized,
{
    fn report(&self, event: &StatusEvent) {
        (**self).report(event);
    }
}

/// Default reporter that records status events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredStatusReporter;

impl StructuredStatusReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl StatusReporter for StructuredStatusReporter {
    fn report(&self, event: &StatusEvent) {
        match event {
            StatusEvent::RuntimeNotFound { searched } => {
                tracing::error!(
                    target: STATUS_TARGET,
                    event = "runtime_not_found",
                    searched = ?searched,
                    "no worker runtime found"
                );
            }
            StatusEvent::DependencyMissing { library } => {
                tracing::warn!(
                    target: STATUS_TARGET,
                    event = "dependency_missing",
                    library = %library,
                    "worker library missing"
                );
            }
            StatusEvent::InstallProgress { percent, message } => {
                tracing::info!(
                    target: STATUS_TARGET,
                    event = "install_progress",
                    percent,
                    message = %message,
                    "installation progress"
                );
            }
            StatusEvent::InstallComplete { success } => {
                tracing::info!(
                    target: STATUS_TARGET,
                    event = "install_complete",
                    success,
                    "installation finished"
                );
            }
            StatusEvent::Started { process_group } => {
                tracing::info!(
                    target: STATUS_TARGET,
                    event = "started",
                    process_group = %process_group,
                    "worker started"
                );
            }
            StatusEvent::Stopped => {
                tracing::info!(
                    target: STATUS_TARGET,
                    event = "stopped",
                    "worker stopped"
                );
            }
            StatusEvent::Failed { reason } => {
                tracing::error!(
                    target: STATUS_TARGET,
                    event = "failed",
                    reason = %reason,
                    "supervisor operation failed"
                );
            }
        }
    }
}

/// Reporter that logs each event and fans it out to subscribers.
///
/// Slow subscribers lag rather than block the supervisor; see
/// [`broadcast::Receiver::recv`].
#[derive(Debug, Clone)]
pub struct BroadcastStatusReporter {
    sender: broadcast::Sender<StatusEvent>,
    log: StructuredStatusReporter,
}

impl BroadcastStatusReporter {
    /// Builds a reporter buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            log: StructuredStatusReporter::new(),
        }
    }

    /// Subscribes to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl StatusReporter for BroadcastStatusReporter {
    fn report(&self, event: &StatusEvent) {
        self.log.report(event);
        // Sending only fails when nobody is subscribed.
        let _ = self.sender.send(event.clone());
    }
}
