//! Turns a worker configuration into a confirmed-alive, isolated worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{info, warn};

use pose_sidecar_config::{RuntimePaths, SupervisorTimings, Toolchain, WorkerConfig};

use super::PROCESS_TARGET;
use super::diagnostics::{LOG_TAIL_LINES, log_tail};
use super::errors::LaunchError;
use super::group::ProcessGroupId;
use super::handoff::HandoffRecord;
use super::host::{LaunchCommand, ProcessHost};
use super::liveness::LivenessProbe;
use super::supervised::{GroupSource, SupervisedProcess};

/// Spawns the worker through the isolating wrapper and confirms it survived
/// its startup grace period.
pub struct ProcessLauncher {
    host: Arc<dyn ProcessHost>,
    probe: LivenessProbe,
    handoff: HandoffRecord,
    log_path: PathBuf,
    toolchain: Toolchain,
    timings: SupervisorTimings,
}

impl ProcessLauncher {
    /// Builds a launcher writing its artefacts under `paths`.
    #[must_use]
    pub fn new(
        host: Arc<dyn ProcessHost>,
        paths: &RuntimePaths,
        toolchain: Toolchain,
        timings: SupervisorTimings,
    ) -> Self {
        Self {
            probe: LivenessProbe::new(Arc::clone(&host), timings.probe_attempts),
            host,
            handoff: HandoffRecord::new(paths.handoff_path()),
            log_path: paths.worker_log_path().to_path_buf(),
            toolchain,
            timings,
        }
    }

    /// Renders the wrapper command for `worker`, interpreted by `runtime`.
    pub fn command_for(
        &self,
        runtime: &Path,
        worker: &WorkerConfig,
    ) -> Result<LaunchCommand, LaunchError> {
        Ok(LaunchCommand {
            runtime: resolve_program(runtime)?,
            entry: absolute(self.toolchain.entry_point())?,
            arguments: worker.launch_arguments(),
            working_dir: absolute(self.toolchain.worker_dir())?,
            handoff_path: absolute(self.handoff.path())?,
            log_path: absolute(&self.log_path)?,
        })
    }

    /// Launches the worker and waits until it is confirmed alive.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Spawn`] when the wrapper cannot be created and
    /// [`LaunchError::DiedImmediately`] with the log tail when the worker is
    /// gone by the time the startup grace period ends.
    pub async fn launch(
        &self,
        runtime: &Path,
        worker: &WorkerConfig,
    ) -> Result<SupervisedProcess, LaunchError> {
        self.handoff.clear();
        let command = self.command_for(runtime, worker)?;
        let launcher = self
            .host
            .spawn(&command)
            .map_err(|source| LaunchError::Spawn { source })?;
        let spawned_at = SystemTime::now();

        tokio::time::sleep(self.timings.handoff_delay).await;
        let (group, source) = match self.handoff.read() {
            Ok(group) => (group, GroupSource::HandoffRecord),
            Err(error) => {
                let launcher_id = launcher.id();
                let group = ProcessGroupId::from_u32(launcher_id).ok_or(
                    LaunchError::NoProcessGroup {
                        launcher: launcher_id,
                    },
                )?;
                warn!(
                    target: PROCESS_TARGET,
                    launcher = launcher_id,
                    error = %error,
                    "handoff record unavailable; falling back to the launcher id"
                );
                (group, GroupSource::LauncherFallback)
            }
        };

        tokio::time::sleep(self.timings.startup_grace).await;
        let mut process =
            SupervisedProcess::new(launcher, group, source, spawned_at, worker.clone());
        if self.probe.check(&mut process) {
            info!(
                target: PROCESS_TARGET,
                group = %group,
                launcher = process.launcher_id(),
                source = ?source,
                "worker confirmed alive"
            );
            return Ok(process);
        }

        let tail = log_tail(&self.log_path, LOG_TAIL_LINES);
        self.handoff.clear();
        warn!(
            target: PROCESS_TARGET,
            group = %group,
            log = %self.log_path.display(),
            "worker exited during startup"
        );
        Err(LaunchError::DiedImmediately {
            group,
            log_tail: tail,
        })
    }
}

impl std::fmt::Debug for ProcessLauncher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ProcessLauncher")
            .field("handoff", &self.handoff)
            .field("log_path", &self.log_path)
            .field("toolchain", &self.toolchain)
            .finish_non_exhaustive()
    }
}

fn absolute(path: &Path) -> Result<PathBuf, LaunchError> {
    std::path::absolute(path).map_err(|source| LaunchError::ResolvePath {
        path: path.to_path_buf(),
        source,
    })
}

/// Bare program names stay bare so the wrapper resolves them through `PATH`.
fn resolve_program(program: &Path) -> Result<PathBuf, LaunchError> {
    if program.components().count() > 1 {
        absolute(program)
    } else {
        Ok(program.to_path_buf())
    }
}
