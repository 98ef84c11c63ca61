//! Single-flight installation of the worker's library.
//!
//! The package installer runs detached, so its exit status is never observed.
//! Completion is inferred by re-running the library check until the wait
//! window closes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::Instant;
use tracing::{info, warn};

use crate::process::Invocation;
use crate::status::{StatusEvent, StatusReporter};

use super::{DEPENDENCY_TARGET, DependencyError, DependencyResolver, run_blocking};

/// Result of [`DependencyResolver::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The library is importable from `runtime`.
    Installed {
        /// Runtime inside the isolated environment.
        runtime: PathBuf,
    },
    /// Another installation was already running; nothing was done.
    AlreadyInProgress,
}

/// Progress of an in-flight installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationJob {
    runtime: PathBuf,
    requirements: PathBuf,
    progress: Option<u8>,
}

impl InstallationJob {
    /// Starts tracking an installation into `runtime`.
    #[must_use]
    pub fn new(runtime: impl Into<PathBuf>, requirements: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            requirements: requirements.into(),
            progress: None,
        }
    }

    /// Runtime the packages are installed for.
    #[must_use]
    pub fn runtime(&self) -> &Path {
        self.runtime.as_path()
    }

    /// Requirements descriptor handed to the installer.
    #[must_use]
    pub fn requirements(&self) -> &Path {
        self.requirements.as_path()
    }

    /// Last reported percentage.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress.unwrap_or(0)
    }

    /// Reports a milestone unless it would move progress backwards or repeat.
    ///
    /// Returns whether the milestone was reported.
    pub fn advance(&mut self, percent: u8, message: &str, reporter: &dyn StatusReporter) -> bool {
        let percent = percent.min(100);
        if self.progress.is_some_and(|current| percent <= current) {
            return false;
        }
        self.progress = Some(percent);
        reporter.report(&StatusEvent::InstallProgress {
            percent,
            message: message.to_owned(),
        });
        true
    }
}

struct InstallGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InstallGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InstallGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl DependencyResolver {
    /// Whether an installation is currently running.
    #[must_use]
    pub fn is_installing(&self) -> bool {
        self.installing.load(Ordering::Acquire)
    }

    /// Creates the isolated environment with `base_runtime`, then installs the
    /// worker's requirements into it.
    ///
    /// A second call while one is running returns
    /// [`InstallOutcome::AlreadyInProgress`] without doing anything.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError::InstallFailed`] when environment creation
    /// exits nonzero (never retried), when the installer cannot be spawned, or
    /// when the library is still missing after the wait window.
    pub async fn install(
        &self,
        base_runtime: &Path,
        reporter: &dyn StatusReporter,
    ) -> Result<InstallOutcome, DependencyError> {
        let Some(_guard) = InstallGuard::acquire(&self.installing) else {
            info!(
                target: DEPENDENCY_TARGET,
                "installation already in progress"
            );
            return Ok(InstallOutcome::AlreadyInProgress);
        };
        let mut job = InstallationJob::new(
            self.toolchain.venv_runtime(),
            self.toolchain.requirements(),
        );
        job.advance(0, "preparing installation", reporter);

        self.create_environment(base_runtime, &mut job, reporter)
            .await?;
        let runtime = job.runtime().to_path_buf();
        if !self.probe_runtime(&runtime).await? {
            return Err(DependencyError::InstallFailed {
                reason: format!(
                    "isolated environment has no runtime at '{}'",
                    runtime.display()
                ),
            });
        }

        self.spawn_installer(&job).await?;
        job.advance(50, "installing packages", reporter);

        if self.await_library(&runtime, &mut job, reporter).await? {
            job.advance(100, "installation complete", reporter);
            info!(
                target: DEPENDENCY_TARGET,
                runtime = %runtime.display(),
                "installation verified"
            );
            return Ok(InstallOutcome::Installed { runtime });
        }
        Err(DependencyError::InstallFailed {
            reason: format!(
                "{} still unavailable after {} s; see '{}'",
                self.toolchain.library(),
                self.timings.install_wait.as_secs(),
                self.install_log.display()
            ),
        })
    }

    async fn create_environment(
        &self,
        base_runtime: &Path,
        job: &mut InstallationJob,
        reporter: &dyn StatusReporter,
    ) -> Result<(), DependencyError> {
        let invocation = Invocation::new(base_runtime, self.timings.command_timeout)
            .arg("-m")
            .arg("venv")
            .arg(self.toolchain.venv_dir());
        job.advance(10, "creating isolated environment", reporter);
        let output = run_blocking(Arc::clone(&self.runner), invocation.clone())
            .await?
            .map_err(|source| DependencyError::InstallFailed {
                reason: format!("could not run '{}': {source}", invocation.display()),
            })?;
        if !output.success() {
            let status = output
                .status
                .map_or_else(|| String::from("a signal"), |code| format!("status {code}"));
            return Err(DependencyError::InstallFailed {
                reason: format!(
                    "environment creation exited with {status}: {}",
                    output.diagnostic()
                ),
            });
        }
        job.advance(25, "isolated environment created", reporter);
        Ok(())
    }

    async fn spawn_installer(&self, job: &InstallationJob) -> Result<(), DependencyError> {
        let invocation = Invocation::new(job.runtime(), self.timings.command_timeout)
            .args(["-m", "pip", "install", "-r"])
            .arg(job.requirements());
        let runner = Arc::clone(&self.runner);
        let log = self.install_log.clone();
        let rendered = invocation.display();
        let pid = tokio::task::spawn_blocking(move || runner.spawn_detached(&invocation, &log))
            .await
            .map_err(|source| DependencyError::Task { source })?
            .map_err(|source| DependencyError::InstallFailed {
                reason: format!("could not spawn '{rendered}': {source}"),
            })?;
        info!(
            target: DEPENDENCY_TARGET,
            pid,
            log = %self.install_log.display(),
            "package installer spawned"
        );
        Ok(())
    }

    /// Re-checks the library every poll interval until it imports or the wait
    /// window closes, then checks one final time.
    async fn await_library(
        &self,
        runtime: &Path,
        job: &mut InstallationJob,
        reporter: &dyn StatusReporter,
    ) -> Result<bool, DependencyError> {
        let deadline = Instant::now() + self.timings.install_wait;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.timings.install_poll.min(deadline - now)).await;
            job.advance(75, "verifying installation", reporter);
            match self.check_library(runtime).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        target: DEPENDENCY_TARGET,
                        error = %error,
                        "library re-check failed while installing"
                    );
                }
            }
        }
        self.check_library(runtime).await
    }
}
