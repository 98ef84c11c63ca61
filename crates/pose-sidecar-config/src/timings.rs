//! Timing budget for the supervisor's start and stop sequences.

use std::time::Duration;

use crate::Config;
use crate::error::ConfigError;

/// Every delay, poll interval and attempt budget the supervisor obeys.
///
/// The worst-case stop duration is bounded by
/// [`SupervisorTimings::termination_budget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTimings {
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Delay before the handoff record is read.
    pub handoff_delay: Duration,
    /// Delay before the post-launch liveness probe.
    pub startup_grace: Duration,
    /// Delay between silencing the heartbeat and the graceful signal.
    pub shutdown_grace: Duration,
    /// Liveness poll interval after the graceful signal.
    pub terminate_poll: Duration,
    /// Bounded wait after the graceful signal.
    pub terminate_wait: Duration,
    /// Delay after each forceful signal.
    pub kill_settle: Duration,
    /// Number of forceful signals sent before giving up.
    pub kill_attempts: u32,
    /// Timeout applied to each bounded command invocation.
    pub command_timeout: Duration,
    /// Attempts allowed for a probe invocation that fails to run.
    pub probe_attempts: u32,
    /// Wait window granted to the detached package installer.
    pub install_wait: Duration,
    /// Library re-check interval while the installer runs.
    pub install_poll: Duration,
}

impl SupervisorTimings {
    /// Validates the timing fields of `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            heartbeat_interval: non_zero("heartbeat_interval_ms", config.heartbeat_interval_ms)?,
            handoff_delay: Duration::from_millis(config.handoff_delay_ms),
            startup_grace: Duration::from_millis(config.startup_grace_ms),
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
            terminate_poll: non_zero("terminate_poll_ms", config.terminate_poll_ms)?,
            terminate_wait: Duration::from_millis(config.terminate_wait_ms),
            kill_settle: Duration::from_millis(config.kill_settle_ms),
            kill_attempts: attempts("kill_attempts", config.kill_attempts)?,
            command_timeout: non_zero("command_timeout_ms", config.command_timeout_ms)?,
            probe_attempts: attempts("probe_attempts", config.probe_attempts)?,
            install_wait: Duration::from_millis(config.install_wait_ms),
            install_poll: non_zero("install_poll_ms", config.install_poll_ms)?,
        })
    }

    /// Number of liveness polls that fit in the bounded graceful wait.
    #[must_use]
    pub fn terminate_polls(&self) -> u32 {
        let polls = self.terminate_wait.as_nanos() / self.terminate_poll.as_nanos().max(1);
        u32::try_from(polls).unwrap_or(u32::MAX)
    }

    /// Upper bound on the time a full escalation can spend waiting.
    #[must_use]
    pub fn termination_budget(&self) -> Duration {
        let polling = self.terminate_poll.saturating_mul(self.terminate_polls());
        let killing = self.kill_settle.saturating_mul(self.kill_attempts);
        self.shutdown_grace
            .saturating_add(polling)
            .saturating_add(killing)
    }
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        match Self::from_config(&Config::default()) {
            Ok(timings) => timings,
            Err(_) => Self {
                heartbeat_interval: Duration::from_millis(500),
                handoff_delay: Duration::from_millis(300),
                startup_grace: Duration::from_millis(2_500),
                shutdown_grace: Duration::from_secs(1),
                terminate_poll: Duration::from_millis(100),
                terminate_wait: Duration::from_secs(3),
                kill_settle: Duration::from_millis(500),
                kill_attempts: 2,
                command_timeout: Duration::from_secs(15),
                probe_attempts: 2,
                install_wait: Duration::from_secs(180),
                install_poll: Duration::from_secs(2),
            },
        }
    }
}

fn non_zero(field: &'static str, millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::ZeroDuration { field });
    }
    Ok(Duration::from_millis(millis))
}

fn attempts(field: &'static str, value: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroAttempts { field });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_a_few_seconds() {
        let timings = SupervisorTimings::default();
        assert_eq!(timings.terminate_polls(), 30);
        assert_eq!(timings.termination_budget(), Duration::from_secs(5));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = Config {
            terminate_poll_ms: 0,
            ..Config::default()
        };
        assert_eq!(
            SupervisorTimings::from_config(&config),
            Err(ConfigError::ZeroDuration {
                field: "terminate_poll_ms"
            })
        );
    }

    #[test]
    fn zero_kill_attempts_are_rejected() {
        let config = Config {
            kill_attempts: 0,
            ..Config::default()
        };
        assert_eq!(
            SupervisorTimings::from_config(&config),
            Err(ConfigError::ZeroAttempts {
                field: "kill_attempts"
            })
        );
    }
}
