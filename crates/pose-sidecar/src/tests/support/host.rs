//! Scripted [`ProcessHost`] simulating one worker process group.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::process::{
    LaunchCommand, LauncherHandle, ProcessGroupId, ProcessHost, SignalOutcome, TerminationSignal,
};

use super::journal::{Entry, Journal};

/// Group id the fake wrapper publishes.
pub const FAKE_GROUP: i32 = 4242;
/// Process id of the fake wrapper itself.
pub const FAKE_LAUNCHER: u32 = 5150;

/// How the simulated worker reacts to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerBehaviour {
    /// Exits on the graceful signal.
    #[default]
    Cooperative,
    /// Ignores the graceful signal; dies on the forceful one.
    IgnoresTerm,
    /// Survives every signal.
    Unkillable,
    /// Exits before the startup grace period ends.
    DiesImmediately,
}

impl std::str::FromStr for WorkerBehaviour {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cooperative" => Ok(Self::Cooperative),
            "term-ignoring" => Ok(Self::IgnoresTerm),
            "unkillable" => Ok(Self::Unkillable),
            "crashing" => Ok(Self::DiesImmediately),
            other => Err(format!("unknown worker behaviour '{other}'")),
        }
    }
}

#[derive(Debug)]
struct HostState {
    behaviour: WorkerBehaviour,
    alive: bool,
    handoff_contents: Option<String>,
    spawn_error: Option<io::ErrorKind>,
}

/// Fake process host; clones share state and journal.
#[derive(Debug, Clone)]
pub struct FakeHost {
    journal: Journal,
    state: Arc<Mutex<HostState>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new(Journal::default())
    }
}

impl FakeHost {
    /// Builds a host simulating a cooperative worker.
    #[must_use]
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            state: Arc::new(Mutex::new(HostState {
                behaviour: WorkerBehaviour::Cooperative,
                alive: false,
                handoff_contents: Some(format!("{FAKE_GROUP}\n")),
                spawn_error: None,
            })),
        }
    }

    /// Changes how the next worker reacts.
    pub fn set_behaviour(&self, behaviour: WorkerBehaviour) {
        self.state().behaviour = behaviour;
    }

    /// Makes the wrapper publish `contents` instead of its group id, or
    /// nothing at all.
    pub fn set_handoff_contents(&self, contents: Option<&str>) {
        self.state().handoff_contents = contents.map(str::to_owned);
    }

    /// Makes every spawn fail with `kind`.
    pub fn fail_spawns(&self, kind: io::ErrorKind) {
        self.state().spawn_error = Some(kind);
    }

    /// Whether the simulated group still has members.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state().alive
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().expect("fake host mutex poisoned")
    }
}

impl ProcessHost for FakeHost {
    fn spawn(&self, command: &LaunchCommand) -> io::Result<LauncherHandle> {
        let mut state = self.state();
        if let Some(kind) = state.spawn_error {
            return Err(io::Error::new(kind, "scripted spawn failure"));
        }
        self.journal.record(Entry::Spawn {
            runtime: command.runtime.clone(),
        });
        if let Some(contents) = &state.handoff_contents {
            fs::write(&command.handoff_path, contents)?;
        }
        state.alive = state.behaviour != WorkerBehaviour::DiesImmediately;
        Ok(LauncherHandle::untracked(FAKE_LAUNCHER))
    }

    fn probe_group(&self, group: ProcessGroupId) -> io::Result<bool> {
        self.journal.record(Entry::Probe(group));
        Ok(self.state().alive)
    }

    fn signal_group(
        &self,
        group: ProcessGroupId,
        signal: TerminationSignal,
    ) -> io::Result<SignalOutcome> {
        self.journal.record(Entry::Signal(group, signal));
        let mut state = self.state();
        if !state.alive {
            return Ok(SignalOutcome::NoSuchGroup);
        }
        state.alive = match (state.behaviour, signal) {
            (WorkerBehaviour::Unkillable, _)
            | (WorkerBehaviour::IgnoresTerm, TerminationSignal::Graceful) => true,
            _ => false,
        };
        Ok(SignalOutcome::Delivered)
    }

    fn kill_matching(&self, pattern: &str) -> io::Result<bool> {
        self.journal.record(Entry::KillMatching(pattern.to_owned()));
        Ok(false)
    }

    fn release_device(&self, device: &Path) -> io::Result<bool> {
        self.journal
            .record(Entry::ReleaseDevice(device.to_path_buf()));
        Ok(false)
    }
}
