//! Test double for [`StatusReporter`] that records events for assertions.

use std::sync::Mutex;

use crate::status::{StatusEvent, StatusReporter};

/// Records status events in emission order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .expect("status reporter mutex poisoned")
            .clone()
    }

    /// Install progress percentages in emission order.
    #[must_use]
    pub fn progress(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                StatusEvent::InstallProgress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, event: &StatusEvent) {
        self.events
            .lock()
            .expect("status reporter mutex poisoned")
            .push(event.clone());
    }
}
