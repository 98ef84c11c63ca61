//! Supervisor for the out-of-process pose-tracking worker.
//!
//! The worker is a separate program that captures camera frames, runs pose
//! estimation and streams landmarks to the host over UDP. This crate owns its
//! lifecycle: it verifies the worker's runtime and library (installing them
//! into an isolated environment when missing), launches the worker in its own
//! process group, keeps it alive with a loopback heartbeat and tears it down
//! with a bounded graceful-to-forceful escalation.
//!
//! [`Supervisor`] is the entry point. Its collaborators sit behind traits
//! ([`ProcessHost`], [`CommandRunner`], [`HeartbeatSink`] and
//! [`StatusReporter`]) so the lifecycle can be exercised without touching the
//! operating system.
//!
//! ## Teardown
//!
//! Stopping always runs the same ordered sequence:
//!
//! 1. Silence the heartbeat, then wait a short grace period.
//! 2. Send the graceful signal to the whole process group and poll for exit.
//! 3. Send a bounded number of forceful signals if the group survives.
//! 4. Kill strays by command-line pattern and release the camera device.
//!
//! The sequence is a pure [`EscalationPlan`], driven either cooperatively by
//! [`Supervisor::stop`] or with blocking sleeps by
//! [`Supervisor::shutdown_blocking`] for exit hooks that cannot await.

mod dependency;
mod error;
mod heartbeat;
mod process;
mod run;
mod shutdown;
mod status;
mod supervisor;
mod telemetry;
mod termination;

pub use dependency::{
    DependencyError, DependencyResolver, InstallOutcome, InstallationJob, LIBRARY_MARKER,
};
pub use error::SupervisorError;
pub use heartbeat::{HeartbeatEmitter, HeartbeatHandle, HeartbeatSink, UdpHeartbeatSink};
pub use process::{
    CommandOutput, CommandRunner, GroupSource, HandoffError, HandoffRecord, Invocation,
    LaunchCommand, LaunchError, LauncherHandle, LivenessProbe, ProcessGroupId, ProcessHost,
    ProcessLauncher, SignalOutcome, SupervisedProcess, SystemCommandRunner, SystemProcessHost,
    TerminationSignal,
};
pub use run::{ConfigLoader, RunError, SystemConfigLoader, run_sidecar, run_with};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
pub use status::{BroadcastStatusReporter, StatusEvent, StatusReporter, StructuredStatusReporter};
pub use supervisor::{
    StartOutcome, StopOutcome, Supervisor, SupervisorDeps, SupervisorPhase, SupervisorSettings,
};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
pub use termination::{
    CleanupTargets, EscalationPlan, EscalationStep, Observation, RunningWorker,
    TerminationEscalator, TerminationResult,
};

#[cfg(test)]
mod tests;
