//! Launching, probing and signalling the tracking worker.

mod command;
mod diagnostics;
mod errors;
mod group;
mod handoff;
mod host;
mod launch;
mod liveness;
mod supervised;

pub use command::{CommandOutput, CommandRunner, Invocation, SystemCommandRunner};
pub use errors::LaunchError;
pub use group::ProcessGroupId;
pub use handoff::{HandoffError, HandoffRecord};
pub use host::{
    LaunchCommand, LauncherHandle, ProcessHost, SignalOutcome, SystemProcessHost,
    TerminationSignal,
};
pub use launch::ProcessLauncher;
pub use liveness::LivenessProbe;
pub use supervised::{GroupSource, SupervisedProcess};

#[cfg(test)]
pub(crate) use command::MockCommandRunner;

pub(crate) const PROCESS_TARGET: &str = "pose_sidecar::process";
