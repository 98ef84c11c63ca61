//! Non-destructive liveness probing of the worker's process group.

use std::sync::Arc;

use tracing::{debug, warn};

use super::PROCESS_TARGET;
use super::group::ProcessGroupId;
use super::host::ProcessHost;
use super::supervised::SupervisedProcess;

/// Asks the kernel whether anything in a process group still exists.
#[derive(Clone)]
pub struct LivenessProbe {
    host: Arc<dyn ProcessHost>,
    attempts: u32,
}

impl LivenessProbe {
    /// Builds a probe retrying failed invocations up to `attempts` times.
    #[must_use]
    pub fn new(host: Arc<dyn ProcessHost>, attempts: u32) -> Self {
        Self {
            host,
            attempts: attempts.max(1),
        }
    }

    /// Whether any member of `group` exists.
    ///
    /// A probe that keeps failing reports the group as alive.
    #[must_use]
    pub fn is_alive(&self, group: ProcessGroupId) -> bool {
        for attempt in 1..=self.attempts {
            match self.host.probe_group(group) {
                Ok(alive) => {
                    debug!(
                        target: PROCESS_TARGET,
                        group = %group,
                        alive,
                        "liveness probe"
                    );
                    return alive;
                }
                Err(error) => {
                    debug!(
                        target: PROCESS_TARGET,
                        group = %group,
                        attempt,
                        error = %error,
                        "liveness probe failed"
                    );
                }
            }
        }
        warn!(
            target: PROCESS_TARGET,
            group = %group,
            attempts = self.attempts,
            "liveness probe kept failing; assuming the group is alive"
        );
        true
    }

    /// Reaps the launcher, then probes the process's group.
    #[must_use]
    pub fn check(&self, process: &mut SupervisedProcess) -> bool {
        process.reap_launcher();
        self.is_alive(process.group())
    }
}

impl std::fmt::Debug for LivenessProbe {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LivenessProbe")
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
