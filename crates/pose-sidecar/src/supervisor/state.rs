//! Supervisor lifecycle states.

use crate::process::ProcessGroupId;
use crate::termination::RunningWorker;

/// Lifecycle state with the data each phase owns.
///
/// Only [`SupervisorState::Running`] owns a worker, so the heartbeat exists
/// exactly while the supervisor is running.
#[derive(Debug, Default)]
pub(crate) enum SupervisorState {
    #[default]
    Idle,
    CheckingDependencies,
    Installing,
    Starting,
    Running(RunningWorker),
    Stopping {
        group: ProcessGroupId,
    },
}

impl SupervisorState {
    pub(crate) const fn phase(&self) -> SupervisorPhase {
        match self {
            Self::Idle => SupervisorPhase::Idle,
            Self::CheckingDependencies => SupervisorPhase::CheckingDependencies,
            Self::Installing => SupervisorPhase::Installing,
            Self::Starting => SupervisorPhase::Starting,
            Self::Running(_) => SupervisorPhase::Running,
            Self::Stopping { .. } => SupervisorPhase::Stopping,
        }
    }

    pub(crate) const fn process_group(&self) -> Option<ProcessGroupId> {
        match self {
            Self::Running(worker) => Some(worker.process.group()),
            Self::Stopping { group } => Some(*group),
            _ => None,
        }
    }

    /// Moves a running worker out, leaving [`SupervisorState::Stopping`].
    pub(crate) fn begin_stopping(&mut self) -> Option<RunningWorker> {
        match std::mem::take(self) {
            Self::Running(worker) => {
                *self = Self::Stopping {
                    group: worker.process.group(),
                };
                Some(worker)
            }
            other => {
                *self = other;
                None
            }
        }
    }
}

/// Payload-free view of the supervisor's lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorPhase {
    /// No worker exists.
    Idle,
    /// Probing the runtime and library.
    CheckingDependencies,
    /// Installing the worker's library.
    Installing,
    /// Launching and confirming the worker.
    Starting,
    /// The worker is confirmed alive and receiving heartbeats.
    Running,
    /// The termination sequence is running.
    Stopping,
}
