//! Scenario world wiring a [`Supervisor`] to the journaling doubles.
//!
//! The world owns a current-thread runtime with paused time, so every delay in
//! the lifecycle is auto-advanced and elapsed time is measured virtually.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio::time::Instant;

use pose_sidecar_config::{
    Config, LaunchTrigger, RuntimePaths, SupervisorTimings, Toolchain, WorkerConfig,
};

use crate::error::SupervisorError;
use crate::process::HandoffRecord;
use crate::supervisor::{
    StartOutcome, StopOutcome, Supervisor, SupervisorDeps, SupervisorSettings,
};

use super::host::FakeHost;
use super::journal::Journal;
use super::reporter::RecordingReporter;
use super::runner::FakeRunner;
use super::sink::JournalSink;

/// Millisecond-scale timings for tests that sleep for real.
#[must_use]
pub fn fast_timings() -> SupervisorTimings {
    SupervisorTimings {
        heartbeat_interval: Duration::from_millis(5),
        handoff_delay: Duration::from_millis(1),
        startup_grace: Duration::from_millis(1),
        shutdown_grace: Duration::from_millis(1),
        terminate_poll: Duration::from_millis(1),
        terminate_wait: Duration::from_millis(5),
        kill_settle: Duration::from_millis(1),
        ..SupervisorTimings::default()
    }
}

/// Scenario world shared across lifecycle steps.
pub struct SupervisorWorld {
    runtime: Runtime,
    dir: TempDir,
    pub journal: Journal,
    pub host: FakeHost,
    pub runner: FakeRunner,
    pub reporter: Arc<RecordingReporter>,
    pub timings: SupervisorTimings,
    supervisor: Option<Supervisor>,
    worker: WorkerConfig,
    pub start_results: Vec<Result<StartOutcome, SupervisorError>>,
    pub stop_result: Option<Result<StopOutcome, SupervisorError>>,
    pub stop_elapsed: Option<Duration>,
}

impl SupervisorWorld {
    /// Builds a world with default timings and healthy dependencies.
    #[must_use]
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("test runtime builds");
        let journal = Journal::default();
        Self {
            runtime,
            dir: TempDir::new().expect("temp dir"),
            host: FakeHost::new(journal.clone()),
            runner: FakeRunner::new(journal.clone()),
            journal,
            reporter: Arc::new(RecordingReporter::default()),
            timings: SupervisorTimings::default(),
            supervisor: None,
            worker: WorkerConfig::from_config(&Config::default()).expect("defaults validate"),
            start_results: Vec::new(),
            stop_result: None,
            stop_elapsed: None,
        }
    }

    /// Toolchain rooted in the world's temporary worker directory.
    #[must_use]
    pub fn toolchain(&self) -> Toolchain {
        Toolchain::new(
            self.dir.path().join("worker"),
            "main.py",
            "python3",
            "mediapipe",
        )
    }

    /// Runtime artefact paths inside the world's temporary directory.
    #[must_use]
    pub fn paths(&self) -> RuntimePaths {
        RuntimePaths::in_directory(self.dir.path().join("run")).expect("runtime paths")
    }

    /// The handoff record the supervisor manages.
    #[must_use]
    pub fn handoff(&self) -> HandoffRecord {
        HandoffRecord::new(self.paths().handoff_path())
    }

    /// The supervisor, built on first use.
    pub fn supervisor(&mut self) -> &Supervisor {
        if self.supervisor.is_none() {
            let settings = SupervisorSettings {
                toolchain: self.toolchain(),
                paths: self.paths(),
                timings: self.timings,
                launch_trigger: LaunchTrigger::OnDemand,
                release_camera_device: true,
            };
            let deps = SupervisorDeps {
                host: Arc::new(self.host.clone()),
                runner: Arc::new(self.runner.clone()),
                sink: Arc::new(JournalSink::new(self.journal.clone())),
                reporter: self.reporter.clone(),
            };
            self.supervisor = Some(Supervisor::new(settings, deps));
        }
        self.supervisor.as_ref().expect("supervisor was just built")
    }

    /// Requests a start and records the outcome.
    pub fn start(&mut self) {
        let worker = self.worker.clone();
        self.supervisor();
        let supervisor = self.supervisor.as_ref().expect("supervisor built");
        let result = self.runtime.block_on(supervisor.start(worker));
        self.start_results.push(result);
    }

    /// Lets virtual time pass while the worker runs.
    pub fn run_for(&self, duration: Duration) {
        self.runtime
            .block_on(async { tokio::time::sleep(duration).await });
    }

    /// Requests a stop, recording the outcome and its virtual duration.
    pub fn stop(&mut self) {
        self.supervisor();
        let supervisor = self.supervisor.as_ref().expect("supervisor built");
        let (result, elapsed) = self.runtime.block_on(async {
            let began = Instant::now();
            let result = supervisor.stop().await;
            (result, began.elapsed())
        });
        self.stop_result = Some(result);
        self.stop_elapsed = Some(elapsed);
    }

    /// Outcome of the most recent start.
    #[must_use]
    pub fn last_start(&self) -> Option<&Result<StartOutcome, SupervisorError>> {
        self.start_results.last()
    }

    /// Whether the supervisor reports a running worker.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.supervisor
            .as_ref()
            .is_some_and(Supervisor::is_running)
    }

    /// Running worker's group as the supervisor reports it.
    #[must_use]
    pub fn current_group(&self) -> Option<crate::process::ProcessGroupId> {
        self.supervisor
            .as_ref()
            .and_then(Supervisor::current_process_group)
    }
}

impl Drop for SupervisorWorld {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            let _ = self.runtime.block_on(supervisor.stop());
        }
    }
}
