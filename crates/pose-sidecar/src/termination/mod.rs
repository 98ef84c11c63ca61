//! Graceful-to-forceful teardown of the worker's process group.
//!
//! [`TerminationEscalator::terminate`] drives the [`EscalationPlan`] with
//! cooperative suspension; [`TerminationEscalator::terminate_blocking`] drives
//! the same plan with blocking sleeps for exit hooks that cannot await. Both
//! end by deleting the handoff record.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use pose_sidecar_config::SupervisorTimings;

use crate::heartbeat::HeartbeatHandle;
use crate::process::{
    HandoffRecord, LivenessProbe, ProcessHost, SignalOutcome, SupervisedProcess,
    TerminationSignal,
};

mod plan;

pub use plan::{EscalationPlan, EscalationStep, Observation, TerminationResult};

const TERMINATION_TARGET: &str = "pose_sidecar::termination";

/// A worker confirmed alive together with its heartbeat schedule.
///
/// Owning the [`HeartbeatHandle`] here ties the heartbeat's lifetime to the
/// running state: dropping the worker stops the schedule.
#[derive(Debug)]
pub struct RunningWorker {
    /// The supervised worker.
    pub process: SupervisedProcess,
    /// The worker's heartbeat schedule.
    pub heartbeat: HeartbeatHandle,
}

/// Best-effort cleanup targets used after signalling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTargets {
    /// Command-line fragment identifying stray workers.
    pub entry_pattern: String,
    /// Camera device to force-release, if enabled.
    pub device: Option<PathBuf>,
}

/// Runs the termination sequence for a [`RunningWorker`].
pub struct TerminationEscalator {
    host: Arc<dyn ProcessHost>,
    probe: LivenessProbe,
    handoff: HandoffRecord,
    timings: SupervisorTimings,
    entry_pattern: String,
    release_device: bool,
    in_flight: AtomicBool,
}

impl TerminationEscalator {
    /// Builds an escalator for workers started from `entry_pattern`.
    #[must_use]
    pub fn new(
        host: Arc<dyn ProcessHost>,
        handoff: HandoffRecord,
        timings: SupervisorTimings,
        entry_pattern: impl Into<String>,
        release_device: bool,
    ) -> Self {
        Self {
            probe: LivenessProbe::new(Arc::clone(&host), timings.probe_attempts),
            host,
            handoff,
            timings,
            entry_pattern: entry_pattern.into(),
            release_device,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a termination sequence is running.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Cleanup targets for `process`.
    #[must_use]
    pub fn cleanup_targets(&self, process: &SupervisedProcess) -> CleanupTargets {
        CleanupTargets {
            entry_pattern: self.entry_pattern.clone(),
            device: self
                .release_device
                .then(|| process.config().camera_device()),
        }
    }

    /// Terminates `worker`, suspending cooperatively between steps.
    ///
    /// Returns `None` without acting when another sequence is in flight.
    pub async fn terminate(&self, worker: RunningWorker) -> Option<TerminationResult> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let RunningWorker {
            mut process,
            heartbeat,
        } = worker;
        let mut heartbeat = Some(heartbeat);
        let targets = self.cleanup_targets(&process);
        let mut plan = EscalationPlan::new(&self.timings);
        let mut observation = Observation::Done;
        let result = loop {
            observation = match plan.next(observation) {
                EscalationStep::SilenceHeartbeat => {
                    if let Some(handle) = heartbeat.take() {
                        handle.deactivate().await;
                    }
                    Observation::Done
                }
                EscalationStep::Wait(duration) => {
                    tokio::time::sleep(duration).await;
                    Observation::Done
                }
                EscalationStep::Signal(signal) => self.signal(&process, signal),
                EscalationStep::Probe => self.probe(&mut process),
                EscalationStep::FallbackCleanup => {
                    let host = Arc::clone(&self.host);
                    let cleanup = targets.clone();
                    if let Err(join_error) =
                        tokio::task::spawn_blocking(move || fallback_cleanup(host.as_ref(), &cleanup))
                            .await
                    {
                        warn!(
                            target: TERMINATION_TARGET,
                            error = %join_error,
                            "fallback cleanup task failed"
                        );
                    }
                    Observation::Done
                }
                EscalationStep::Finish(result) => break result,
            };
        };
        Some(self.conclude(&process, result))
    }

    /// Terminates `worker` with blocking sleeps.
    ///
    /// Returns `None` without acting when another sequence is in flight.
    pub fn terminate_blocking(&self, worker: RunningWorker) -> Option<TerminationResult> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let RunningWorker {
            mut process,
            heartbeat,
        } = worker;
        let mut heartbeat = Some(heartbeat);
        let targets = self.cleanup_targets(&process);
        let mut plan = EscalationPlan::new(&self.timings);
        let mut observation = Observation::Done;
        let result = loop {
            observation = match plan.next(observation) {
                EscalationStep::SilenceHeartbeat => {
                    if let Some(handle) = heartbeat.take() {
                        handle.deactivate_blocking();
                    }
                    Observation::Done
                }
                EscalationStep::Wait(duration) => {
                    std::thread::sleep(duration);
                    Observation::Done
                }
                EscalationStep::Signal(signal) => self.signal(&process, signal),
                EscalationStep::Probe => self.probe(&mut process),
                EscalationStep::FallbackCleanup => {
                    fallback_cleanup(self.host.as_ref(), &targets);
                    Observation::Done
                }
                EscalationStep::Finish(result) => break result,
            };
        };
        Some(self.conclude(&process, result))
    }

    fn signal(&self, process: &SupervisedProcess, signal: TerminationSignal) -> Observation {
        let group = process.group();
        match self.host.signal_group(group, signal) {
            Ok(SignalOutcome::Delivered) => {
                info!(
                    target: TERMINATION_TARGET,
                    group = %group,
                    signal = ?signal,
                    "signal delivered to process group"
                );
                Observation::Done
            }
            Ok(SignalOutcome::NoSuchGroup) => {
                info!(
                    target: TERMINATION_TARGET,
                    group = %group,
                    signal = ?signal,
                    "process group already gone"
                );
                Observation::Gone
            }
            Err(error) => {
                warn!(
                    target: TERMINATION_TARGET,
                    group = %group,
                    signal = ?signal,
                    error = %error,
                    "failed to signal process group"
                );
                Observation::Done
            }
        }
    }

    fn probe(&self, process: &mut SupervisedProcess) -> Observation {
        if self.probe.check(process) {
            Observation::Alive
        } else {
            Observation::Gone
        }
    }

    fn conclude(&self, process: &SupervisedProcess, result: TerminationResult) -> TerminationResult {
        self.handoff.clear();
        let group = process.group();
        match result {
            TerminationResult::Survived { kills } => {
                error!(
                    target: TERMINATION_TARGET,
                    group = %group,
                    kills,
                    "worker survived forceful termination; it has likely escaped its \
                     process group and needs operator intervention"
                );
            }
            TerminationResult::Graceful | TerminationResult::Forced { .. } => {
                info!(
                    target: TERMINATION_TARGET,
                    group = %group,
                    result = ?result,
                    "worker terminated"
                );
            }
        }
        result
    }
}

impl std::fmt::Debug for TerminationEscalator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TerminationEscalator")
            .field("handoff", &self.handoff)
            .field("timings", &self.timings)
            .field("entry_pattern", &self.entry_pattern)
            .field("release_device", &self.release_device)
            .finish_non_exhaustive()
    }
}

struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        match flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Some(Self { flag }),
            Err(_) => {
                info!(
                    target: TERMINATION_TARGET,
                    "termination already in flight"
                );
                None
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn fallback_cleanup(host: &dyn ProcessHost, targets: &CleanupTargets) {
    match host.kill_matching(&targets.entry_pattern) {
        Ok(true) => warn!(
            target: TERMINATION_TARGET,
            pattern = %targets.entry_pattern,
            "killed stray worker processes by pattern"
        ),
        Ok(false) => {}
        Err(error) => warn!(
            target: TERMINATION_TARGET,
            pattern = %targets.entry_pattern,
            error = %error,
            "pattern-based cleanup failed"
        ),
    }
    let Some(device) = targets.device.as_deref() else {
        return;
    };
    match host.release_device(device) {
        Ok(true) => warn!(
            target: TERMINATION_TARGET,
            device = %device.display(),
            "force-released camera device"
        ),
        Ok(false) => {}
        Err(error) => warn!(
            target: TERMINATION_TARGET,
            device = %device.display(),
            error = %error,
            "camera device release failed"
        ),
    }
}
