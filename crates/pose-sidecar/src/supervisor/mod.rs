//! The supervisor state machine composing dependency checks, launch,
//! heartbeat and termination into start and stop operations.
//!
//! `start` and `stop` are serialised by an async lifecycle lock: overlapping
//! starts queue and the later one observes the running worker, and a `stop`
//! issued while a start is still checking dependencies or installing runs once
//! that start has finished. The state itself sits behind a short-lived
//! synchronous lock so status queries never wait on a lifecycle operation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use pose_sidecar_config::{
    Config, LaunchTrigger, RuntimePaths, SupervisorTimings, Toolchain, WorkerConfig,
};

use crate::dependency::{DependencyResolver, InstallOutcome};
use crate::error::SupervisorError;
use crate::heartbeat::{HeartbeatEmitter, HeartbeatSink, UdpHeartbeatSink};
use crate::process::{
    CommandRunner, HandoffRecord, ProcessGroupId, ProcessHost, ProcessLauncher,
    SystemCommandRunner, SystemProcessHost,
};
use crate::status::{StatusEvent, StatusReporter};
use crate::termination::{RunningWorker, TerminationEscalator, TerminationResult};

mod state;

use state::SupervisorState;
pub use state::SupervisorPhase;

const SUPERVISOR_TARGET: &str = "pose_sidecar::supervisor";

/// Validated settings the supervisor is built from.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Worker runtime and entry point.
    pub toolchain: Toolchain,
    /// Handoff record and log locations.
    pub paths: RuntimePaths,
    /// Delays, poll intervals and attempt budgets.
    pub timings: SupervisorTimings,
    /// Whether `host_ready` starts the worker.
    pub launch_trigger: LaunchTrigger,
    /// Whether teardown force-releases the camera device.
    pub release_camera_device: bool,
}

impl SupervisorSettings {
    /// Validates the supervisor-facing fields of `config` and prepares the
    /// runtime directory.
    pub fn from_config(config: &Config) -> Result<Self, SupervisorError> {
        Ok(Self {
            toolchain: Toolchain::from_config(config)?,
            paths: RuntimePaths::from_config(config)?,
            timings: SupervisorTimings::from_config(config)?,
            launch_trigger: config.launch_trigger(),
            release_camera_device: config.release_camera_device,
        })
    }
}

/// Collaborators the supervisor drives.
#[derive(Clone)]
pub struct SupervisorDeps {
    /// Spawns, probes and signals the worker.
    pub host: Arc<dyn ProcessHost>,
    /// Runs dependency probes and the installer.
    pub runner: Arc<dyn CommandRunner>,
    /// Carries heartbeat datagrams.
    pub sink: Arc<dyn HeartbeatSink>,
    /// Receives status events.
    pub reporter: Arc<dyn StatusReporter>,
}

impl SupervisorDeps {
    /// Production collaborators.
    #[must_use]
    pub fn system(timings: &SupervisorTimings, reporter: Arc<dyn StatusReporter>) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
        Self {
            host: Arc::new(SystemProcessHost::new(
                Arc::clone(&runner),
                timings.command_timeout,
            )),
            runner,
            sink: Arc::new(UdpHeartbeatSink::new()),
            reporter,
        }
    }
}

/// Result of a successful [`Supervisor::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new worker was launched and confirmed alive.
    Launched(ProcessGroupId),
    /// A worker was already running; nothing was spawned.
    AlreadyRunning(ProcessGroupId),
}

impl StartOutcome {
    /// The running worker's process group.
    #[must_use]
    pub const fn process_group(self) -> ProcessGroupId {
        match self {
            Self::Launched(group) | Self::AlreadyRunning(group) => group,
        }
    }
}

/// Result of a successful [`Supervisor::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No worker was running; nothing was done.
    NotRunning,
    /// The worker was terminated.
    Stopped(TerminationResult),
}

/// Owns the single supervised worker.
pub struct Supervisor {
    lifecycle: tokio::sync::Mutex<()>,
    state: Mutex<SupervisorState>,
    resolver: DependencyResolver,
    launcher: ProcessLauncher,
    heartbeat: HeartbeatEmitter,
    escalator: TerminationEscalator,
    reporter: Arc<dyn StatusReporter>,
    timings: SupervisorTimings,
    launch_trigger: LaunchTrigger,
}

impl Supervisor {
    /// Builds a supervisor from validated settings and collaborators.
    #[must_use]
    pub fn new(settings: SupervisorSettings, deps: SupervisorDeps) -> Self {
        let SupervisorSettings {
            toolchain,
            paths,
            timings,
            launch_trigger,
            release_camera_device,
        } = settings;
        let entry = toolchain.entry_point();
        let entry_pattern = std::path::absolute(entry)
            .unwrap_or_else(|_| entry.to_path_buf())
            .display()
            .to_string();
        Self {
            lifecycle: tokio::sync::Mutex::new(()),
            state: Mutex::new(SupervisorState::Idle),
            resolver: DependencyResolver::new(
                Arc::clone(&deps.runner),
                toolchain.clone(),
                &paths,
                timings,
            ),
            launcher: ProcessLauncher::new(Arc::clone(&deps.host), &paths, toolchain, timings),
            heartbeat: HeartbeatEmitter::new(deps.sink),
            escalator: TerminationEscalator::new(
                deps.host,
                HandoffRecord::new(paths.handoff_path()),
                timings,
                entry_pattern,
                release_camera_device,
            ),
            reporter: deps.reporter,
            timings,
            launch_trigger,
        }
    }

    /// Builds a supervisor driving the local operating system.
    pub fn system(
        config: &Config,
        reporter: Arc<dyn StatusReporter>,
    ) -> Result<Self, SupervisorError> {
        let settings = SupervisorSettings::from_config(config)?;
        let deps = SupervisorDeps::system(&settings.timings, reporter);
        Ok(Self::new(settings, deps))
    }

    /// Ensures a worker described by `worker` is running.
    ///
    /// Idempotent: when a worker is already running this returns
    /// [`StartOutcome::AlreadyRunning`] without spawning anything. Dropping
    /// the returned future part-way through is not supported.
    ///
    /// # Errors
    ///
    /// Returns the failure that stopped the start; it is also reported as
    /// [`StatusEvent::Failed`] and the supervisor returns to idle.
    pub async fn start(&self, worker: WorkerConfig) -> Result<StartOutcome, SupervisorError> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(group) = self.running_group() {
            info!(
                target: SUPERVISOR_TARGET,
                group = %group,
                "worker already running"
            );
            return Ok(StartOutcome::AlreadyRunning(group));
        }
        self.transition(SupervisorState::CheckingDependencies);
        match self.bring_up(worker).await {
            Ok(running) => {
                let group = running.process.group();
                self.transition(SupervisorState::Running(running));
                self.reporter.report(&StatusEvent::Started {
                    process_group: group,
                });
                Ok(StartOutcome::Launched(group))
            }
            Err(error) => {
                self.transition(SupervisorState::Idle);
                self.reporter.report(&StatusEvent::Failed {
                    reason: error.to_string(),
                });
                Err(error)
            }
        }
    }

    /// Starts the worker when configured to launch as soon as the host is
    /// ready; otherwise does nothing.
    pub async fn host_ready(
        &self,
        worker: WorkerConfig,
    ) -> Result<Option<StartOutcome>, SupervisorError> {
        match self.launch_trigger {
            LaunchTrigger::AutoStart => self.start(worker).await.map(Some),
            LaunchTrigger::OnDemand => {
                debug!(
                    target: SUPERVISOR_TARGET,
                    "launch is on demand; waiting for an explicit start"
                );
                Ok(None)
            }
        }
    }

    /// Stops the running worker, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::TerminationIncomplete`] when the worker
    /// survived every forceful signal. Local state is idle either way.
    pub async fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(worker) = self.lock_state().begin_stopping() else {
            debug!(target: SUPERVISOR_TARGET, "stop requested while not running");
            return Ok(StopOutcome::NotRunning);
        };
        let group = worker.process.group();
        let result = self.escalator.terminate(worker).await;
        self.finish_stop(group, result)
    }

    /// Stops the running worker with blocking sleeps, for exit hooks that
    /// cannot await. Also run when the supervisor is dropped.
    ///
    /// A start or stop in progress on another thread is waited for first, so
    /// a worker that finishes launching meanwhile is still terminated. Must
    /// not be called from the thread driving that start.
    ///
    /// # Errors
    ///
    /// As for [`Supervisor::stop`].
    pub fn shutdown_blocking(&self) -> Result<StopOutcome, SupervisorError> {
        let _lifecycle = self.wait_for_lifecycle();
        let Some(worker) = self.lock_state().begin_stopping() else {
            return Ok(StopOutcome::NotRunning);
        };
        let group = worker.process.group();
        let result = self.escalator.terminate_blocking(worker);
        self.finish_stop(group, result)
    }

    /// Whether a worker is confirmed running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase() == SupervisorPhase::Running
    }

    /// Process group of the running or stopping worker.
    #[must_use]
    pub fn current_process_group(&self) -> Option<ProcessGroupId> {
        self.lock_state().process_group()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SupervisorPhase {
        self.lock_state().phase()
    }

    /// Configured launch trigger.
    #[must_use]
    pub const fn launch_trigger(&self) -> LaunchTrigger {
        self.launch_trigger
    }

    /// Timing budget in force.
    #[must_use]
    pub const fn timings(&self) -> &SupervisorTimings {
        &self.timings
    }

    async fn bring_up(&self, worker: WorkerConfig) -> Result<RunningWorker, SupervisorError> {
        let runtime = self.resolve_runtime().await?;
        self.transition(SupervisorState::Starting);
        let process = self.launcher.launch(&runtime, &worker).await?;
        let heartbeat = self
            .heartbeat
            .activate(worker.heartbeat_address(), self.timings.heartbeat_interval);
        Ok(RunningWorker { process, heartbeat })
    }

    async fn resolve_runtime(&self) -> Result<PathBuf, SupervisorError> {
        let Some(runtime) = self.resolver.check_runtime().await? else {
            let searched = self.resolver.runtime_candidates();
            self.reporter.report(&StatusEvent::RuntimeNotFound {
                searched: searched.clone(),
            });
            return Err(SupervisorError::RuntimeNotFound { searched });
        };
        if self.resolver.check_library(&runtime).await? {
            return Ok(runtime);
        }

        let library = self.resolver.toolchain().library().to_owned();
        self.reporter.report(&StatusEvent::DependencyMissing {
            library: library.clone(),
        });
        self.transition(SupervisorState::Installing);
        match self.resolver.install(&runtime, self.reporter.as_ref()).await {
            Ok(InstallOutcome::Installed { runtime }) => {
                self.reporter
                    .report(&StatusEvent::InstallComplete { success: true });
                Ok(runtime)
            }
            Ok(InstallOutcome::AlreadyInProgress) => {
                Err(SupervisorError::DependencyMissing { library })
            }
            Err(error) => {
                self.reporter
                    .report(&StatusEvent::InstallComplete { success: false });
                Err(error.into())
            }
        }
    }

    fn finish_stop(
        &self,
        group: ProcessGroupId,
        result: Option<TerminationResult>,
    ) -> Result<StopOutcome, SupervisorError> {
        self.transition(SupervisorState::Idle);
        let Some(result) = result else {
            warn!(
                target: SUPERVISOR_TARGET,
                group = %group,
                "termination already in flight elsewhere; state reset"
            );
            return Ok(StopOutcome::NotRunning);
        };
        if result.is_complete() {
            self.reporter.report(&StatusEvent::Stopped);
            return Ok(StopOutcome::Stopped(result));
        }
        let error = SupervisorError::TerminationIncomplete { group };
        self.reporter.report(&StatusEvent::Failed {
            reason: error.to_string(),
        });
        self.reporter.report(&StatusEvent::Stopped);
        Err(error)
    }

    fn running_group(&self) -> Option<ProcessGroupId> {
        match &*self.lock_state() {
            SupervisorState::Running(worker) => Some(worker.process.group()),
            _ => None,
        }
    }

    fn transition(&self, next: SupervisorState) {
        let mut state = self.lock_state();
        debug!(
            target: SUPERVISOR_TARGET,
            from = ?state.phase(),
            to = ?next.phase(),
            "state transition"
        );
        *state = next;
    }

    fn wait_for_lifecycle(&self) -> tokio::sync::MutexGuard<'_, ()> {
        loop {
            if let Ok(guard) = self.lifecycle.try_lock() {
                return guard;
            }
            std::thread::sleep(self.timings.terminate_poll);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown_blocking() {
            warn!(
                target: SUPERVISOR_TARGET,
                error = %error,
                "shutdown on drop did not complete"
            );
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Supervisor")
            .field("phase", &self.phase())
            .field("launcher", &self.launcher)
            .field("escalator", &self.escalator)
            .field("launch_trigger", &self.launch_trigger)
            .finish_non_exhaustive()
    }
}
