//! The single worker instance owned by the supervisor.

use std::time::SystemTime;

use pose_sidecar_config::WorkerConfig;

use super::group::ProcessGroupId;
use super::host::LauncherHandle;

/// How the worker's process-group id was learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSource {
    /// Read from the handoff record published by the wrapper.
    HandoffRecord,
    /// The record was unreadable; the wrapper's own id was used instead.
    LauncherFallback,
}

/// A launched worker confirmed alive after its startup grace period.
#[derive(Debug)]
pub struct SupervisedProcess {
    launcher: LauncherHandle,
    group: ProcessGroupId,
    group_source: GroupSource,
    started_at: SystemTime,
    config: WorkerConfig,
}

impl SupervisedProcess {
    pub(crate) fn new(
        launcher: LauncherHandle,
        group: ProcessGroupId,
        group_source: GroupSource,
        started_at: SystemTime,
        config: WorkerConfig,
    ) -> Self {
        Self {
            launcher,
            group,
            group_source,
            started_at,
            config,
        }
    }

    /// Identifier of the intermediate wrapper.
    #[must_use]
    pub const fn launcher_id(&self) -> u32 {
        self.launcher.id()
    }

    /// The worker's process group.
    #[must_use]
    pub const fn group(&self) -> ProcessGroupId {
        self.group
    }

    /// Where the group id came from.
    #[must_use]
    pub const fn group_source(&self) -> GroupSource {
        self.group_source
    }

    /// Wall-clock time the wrapper was spawned.
    #[must_use]
    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Settings the worker was launched with.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub(crate) fn reap_launcher(&mut self) {
        self.launcher.reap();
    }
}
