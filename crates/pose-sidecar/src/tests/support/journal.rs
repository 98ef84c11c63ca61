//! Shared, timestamped record of every call made on the test doubles.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crate::process::{ProcessGroupId, TerminationSignal};

/// One observed side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A bounded command ran; carries its rendered command line.
    Command(String),
    /// The package installer was spawned detached.
    Installer,
    /// The isolating wrapper was spawned.
    Spawn {
        /// Runtime handed to the wrapper.
        runtime: PathBuf,
    },
    /// A process group was probed.
    Probe(ProcessGroupId),
    /// A process group was signalled.
    Signal(ProcessGroupId, TerminationSignal),
    /// A heartbeat datagram was sent.
    Heartbeat,
    /// Strays were killed by pattern.
    KillMatching(String),
    /// The camera device was released.
    ReleaseDevice(PathBuf),
}

/// Append-only journal shared by all doubles in a test.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(Instant, Entry)>>>,
}

impl Journal {
    /// Appends `entry` stamped with the current (possibly virtual) time.
    pub fn record(&self, entry: Entry) {
        self.entries
            .lock()
            .expect("journal mutex poisoned")
            .push((Instant::now(), entry));
    }

    /// Snapshot of the entries in recording order.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.timed().into_iter().map(|(_, entry)| entry).collect()
    }

    /// Snapshot of the entries with their timestamps.
    #[must_use]
    pub fn timed(&self) -> Vec<(Instant, Entry)> {
        self.entries
            .lock()
            .expect("journal mutex poisoned")
            .clone()
    }

    /// Number of entries matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Entry) -> bool) -> usize {
        self.entries().iter().filter(|entry| predicate(entry)).count()
    }

    /// Index of the last entry matching `predicate`.
    pub fn last_index(&self, predicate: impl Fn(&Entry) -> bool) -> Option<usize> {
        self.entries().iter().rposition(|entry| predicate(entry))
    }

    /// Index of the first entry matching `predicate`.
    pub fn first_index(&self, predicate: impl Fn(&Entry) -> bool) -> Option<usize> {
        self.entries().iter().position(|entry| predicate(entry))
    }
}
