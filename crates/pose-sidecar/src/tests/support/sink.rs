//! Heartbeat sink that journals each datagram.

use std::io;
use std::net::SocketAddr;

use pose_sidecar_config::HEARTBEAT_MARKER;

use crate::heartbeat::HeartbeatSink;

use super::journal::{Entry, Journal};

/// Records heartbeats instead of sending them.
#[derive(Debug, Clone)]
pub struct JournalSink {
    journal: Journal,
}

impl JournalSink {
    /// Builds a sink recording into `journal`.
    #[must_use]
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl HeartbeatSink for JournalSink {
    fn send(&self, _destination: SocketAddr, payload: &[u8]) -> io::Result<()> {
        assert_eq!(payload, &[HEARTBEAT_MARKER][..], "heartbeat payload is one marker byte");
        self.journal.record(Entry::Heartbeat);
        Ok(())
    }
}
