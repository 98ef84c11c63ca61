//! Escalation expressed as a pure step machine.
//!
//! The plan never touches the operating system. A driver asks it for the next
//! [`EscalationStep`], performs the step and feeds back an [`Observation`].
//! The async and blocking drivers share this plan, so both silence the
//! heartbeat before any signal and both end with fallback cleanup.

use std::time::Duration;

use pose_sidecar_config::SupervisorTimings;

use crate::process::TerminationSignal;

/// Action the driver must perform next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStep {
    /// Stop the heartbeat schedule.
    SilenceHeartbeat,
    /// Suspend for the given duration.
    Wait(Duration),
    /// Signal the worker's process group.
    Signal(TerminationSignal),
    /// Probe the worker's process group.
    Probe,
    /// Kill by command-line pattern and release the camera device.
    FallbackCleanup,
    /// The sequence is over.
    Finish(TerminationResult),
}

/// What the driver learned while performing a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The step completed without telling us anything about the worker.
    Done,
    /// The worker's group still has members.
    Alive,
    /// The worker's group is gone.
    Gone,
}

/// How a termination sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationResult {
    /// The group disappeared before any forceful signal.
    Graceful,
    /// The group disappeared after `kills` forceful signals.
    Forced {
        /// Forceful signals sent.
        kills: u32,
    },
    /// The group survived every forceful signal.
    Survived {
        /// Forceful signals sent.
        kills: u32,
    },
}

impl TerminationResult {
    /// Whether the worker is confirmed gone.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        !matches!(self, Self::Survived { .. })
    }

    /// Number of forceful signals sent.
    #[must_use]
    pub const fn kills(self) -> u32 {
        match self {
            Self::Graceful => 0,
            Self::Forced { kills } | Self::Survived { kills } => kills,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Silence,
    Grace,
    SignalGraceful,
    AfterGraceful,
    ProbeGraceful,
    AfterForceful,
    ProbeForceful,
    AfterForcefulProbe,
    Cleanup,
    Done,
}

/// Ordered graceful-to-forceful termination sequence.
#[derive(Debug, Clone)]
pub struct EscalationPlan {
    phase: Phase,
    shutdown_grace: Duration,
    terminate_poll: Duration,
    kill_settle: Duration,
    polls_remaining: u32,
    kills_remaining: u32,
    kills_sent: u32,
    result: Option<TerminationResult>,
}

impl EscalationPlan {
    /// Builds a plan bounded by `timings`.
    #[must_use]
    pub fn new(timings: &SupervisorTimings) -> Self {
        Self {
            phase: Phase::Silence,
            shutdown_grace: timings.shutdown_grace,
            terminate_poll: timings.terminate_poll,
            kill_settle: timings.kill_settle,
            polls_remaining: timings.terminate_polls(),
            kills_remaining: timings.kill_attempts,
            kills_sent: 0,
            result: None,
        }
    }

    /// Advances the plan using what the previous step observed.
    pub fn next(&mut self, observation: Observation) -> EscalationStep {
        match self.phase {
            Phase::Silence => {
                self.phase = Phase::Grace;
                EscalationStep::SilenceHeartbeat
            }
            Phase::Grace => {
                self.phase = Phase::SignalGraceful;
                EscalationStep::Wait(self.shutdown_grace)
            }
            Phase::SignalGraceful => {
                self.phase = Phase::AfterGraceful;
                EscalationStep::Signal(TerminationSignal::Graceful)
            }
            Phase::AfterGraceful => {
                if observation == Observation::Gone {
                    return self.cleanup(TerminationResult::Graceful);
                }
                self.graceful_poll()
            }
            Phase::ProbeGraceful => {
                self.phase = Phase::AfterGraceful;
                EscalationStep::Probe
            }
            Phase::AfterForceful => {
                if observation == Observation::Gone {
                    return self.cleanup(self.forced());
                }
                self.phase = Phase::ProbeForceful;
                EscalationStep::Wait(self.kill_settle)
            }
            Phase::ProbeForceful => {
                self.phase = Phase::AfterForcefulProbe;
                EscalationStep::Probe
            }
            Phase::AfterForcefulProbe => {
                if observation == Observation::Gone {
                    return self.cleanup(self.forced());
                }
                self.escalate()
            }
            Phase::Cleanup => {
                self.phase = Phase::Done;
                self.finish()
            }
            Phase::Done => self.finish(),
        }
    }

    fn graceful_poll(&mut self) -> EscalationStep {
        if self.polls_remaining == 0 {
            return self.escalate();
        }
        self.polls_remaining -= 1;
        self.phase = Phase::ProbeGraceful;
        EscalationStep::Wait(self.terminate_poll)
    }

    fn escalate(&mut self) -> EscalationStep {
        if self.kills_remaining == 0 {
            return self.cleanup(TerminationResult::Survived {
                kills: self.kills_sent,
            });
        }
        self.kills_remaining -= 1;
        self.kills_sent += 1;
        self.phase = Phase::AfterForceful;
        EscalationStep::Signal(TerminationSignal::Forceful)
    }

    fn forced(&self) -> TerminationResult {
        TerminationResult::Forced {
            kills: self.kills_sent,
        }
    }

    fn cleanup(&mut self, result: TerminationResult) -> EscalationStep {
        self.result = Some(result);
        self.phase = Phase::Cleanup;
        EscalationStep::FallbackCleanup
    }

    fn finish(&self) -> EscalationStep {
        EscalationStep::Finish(self.result.unwrap_or(TerminationResult::Survived {
            kills: self.kills_sent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Worker {
        AlreadyGone,
        Cooperative,
        IgnoresTerm,
        Unkillable,
    }

    fn run(worker: Worker) -> Vec<EscalationStep> {
        let timings = SupervisorTimings::default();
        let mut plan = EscalationPlan::new(&timings);
        let mut alive = !matches!(worker, Worker::AlreadyGone);
        let mut observation = Observation::Done;
        let mut steps = Vec::new();
        loop {
            let step = plan.next(observation);
            steps.push(step);
            observation = match step {
                EscalationStep::Signal(signal) => {
                    if !alive {
                        Observation::Gone
                    } else {
                        alive = match (worker, signal) {
                            (Worker::Cooperative, _) => false,
                            (Worker::IgnoresTerm, TerminationSignal::Forceful) => false,
                            _ => true,
                        };
                        Observation::Done
                    }
                }
                EscalationStep::Probe if alive => Observation::Alive,
                EscalationStep::Probe => Observation::Gone,
                EscalationStep::Finish(_) => break,
                _ => Observation::Done,
            };
            assert!(steps.len() < 1_000, "plan never finished");
        }
        steps
    }

    fn count(steps: &[EscalationStep], wanted: EscalationStep) -> usize {
        steps.iter().filter(|step| **step == wanted).count()
    }

    fn waited(steps: &[EscalationStep]) -> Duration {
        steps
            .iter()
            .filter_map(|step| match step {
                EscalationStep::Wait(duration) => Some(*duration),
                _ => None,
            })
            .sum()
    }

    #[test]
    fn cooperative_worker_never_sees_the_forceful_signal() {
        let steps = run(Worker::Cooperative);
        assert_eq!(
            steps,
            vec![
                EscalationStep::SilenceHeartbeat,
                EscalationStep::Wait(Duration::from_secs(1)),
                EscalationStep::Signal(TerminationSignal::Graceful),
                EscalationStep::Wait(Duration::from_millis(100)),
                EscalationStep::Probe,
                EscalationStep::FallbackCleanup,
                EscalationStep::Finish(TerminationResult::Graceful),
            ]
        );
    }

    #[test]
    fn ignoring_the_graceful_signal_earns_exactly_one_kill() {
        let steps = run(Worker::IgnoresTerm);
        assert_eq!(
            count(&steps, EscalationStep::Signal(TerminationSignal::Forceful)),
            1
        );
        assert_eq!(count(&steps, EscalationStep::Probe), 31);
        let tail = &steps[steps.len() - 2..];
        assert_eq!(
            tail,
            &[
                EscalationStep::FallbackCleanup,
                EscalationStep::Finish(TerminationResult::Forced { kills: 1 }),
            ]
        );
    }

    #[test]
    fn unkillable_worker_exhausts_bounded_attempts() {
        let steps = run(Worker::Unkillable);
        let timings = SupervisorTimings::default();
        assert_eq!(
            count(&steps, EscalationStep::Signal(TerminationSignal::Forceful)),
            2
        );
        assert_eq!(
            steps.last(),
            Some(&EscalationStep::Finish(TerminationResult::Survived {
                kills: 2
            }))
        );
        assert_eq!(waited(&steps), timings.termination_budget());
        assert!(steps.contains(&EscalationStep::FallbackCleanup));
    }

    #[test]
    fn vanished_group_skips_polling() {
        let steps = run(Worker::AlreadyGone);
        assert_eq!(count(&steps, EscalationStep::Probe), 0);
        assert_eq!(
            steps.last(),
            Some(&EscalationStep::Finish(TerminationResult::Graceful))
        );
    }

    #[test]
    fn heartbeat_is_silenced_before_any_signal() {
        for worker in [Worker::Cooperative, Worker::IgnoresTerm, Worker::Unkillable] {
            let steps = run(worker);
            let silence = steps
                .iter()
                .position(|step| *step == EscalationStep::SilenceHeartbeat);
            let first_signal = steps
                .iter()
                .position(|step| matches!(step, EscalationStep::Signal(_)));
            assert!(silence < first_signal, "{worker:?} signalled first");
        }
    }

    #[test]
    fn finished_plan_stays_finished() {
        let mut plan = EscalationPlan::new(&SupervisorTimings::default());
        let mut step = plan.next(Observation::Done);
        while !matches!(step, EscalationStep::Finish(_)) {
            let observation = if step == EscalationStep::Probe {
                Observation::Gone
            } else {
                Observation::Done
            };
            step = plan.next(observation);
        }
        assert_eq!(plan.next(Observation::Alive), step);
    }
}
