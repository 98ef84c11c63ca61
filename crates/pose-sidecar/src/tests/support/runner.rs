//! Scripted [`CommandRunner`] answering dependency probes.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dependency::LIBRARY_MARKER;
use crate::process::{CommandOutput, CommandRunner, Invocation};

use super::journal::{Entry, Journal};

#[derive(Debug)]
struct RunnerState {
    runtime_present: bool,
    library_present: bool,
    environment_fails: bool,
    installer_provides_library: bool,
    installer_ran: bool,
}

/// Fake runner simulating the worker's runtime and installer.
#[derive(Debug, Clone)]
pub struct FakeRunner {
    journal: Journal,
    state: Arc<Mutex<RunnerState>>,
}

impl FakeRunner {
    /// Builds a runner whose runtime and library are both present.
    #[must_use]
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            state: Arc::new(Mutex::new(RunnerState {
                runtime_present: true,
                library_present: true,
                environment_fails: false,
                installer_provides_library: true,
                installer_ran: false,
            })),
        }
    }

    /// Whether any runtime answers the version probe.
    pub fn set_runtime_present(&self, present: bool) {
        self.state().runtime_present = present;
    }

    /// Whether the library imports before any installation.
    pub fn set_library_present(&self, present: bool) {
        self.state().library_present = present;
    }

    /// Makes isolated-environment creation exit nonzero.
    pub fn fail_environment_creation(&self) {
        self.state().environment_fails = true;
    }

    /// Whether the detached installer eventually makes the library import.
    pub fn set_installer_provides_library(&self, provides: bool) {
        self.state().installer_provides_library = provides;
    }

    fn state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().expect("fake runner mutex poisoned")
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        self.journal.record(Entry::Command(invocation.display()));
        let state = self.state();
        let arguments: Vec<_> = invocation
            .arguments()
            .iter()
            .map(|argument| argument.to_string_lossy().into_owned())
            .collect();
        match arguments.first().map(String::as_str) {
            Some("--version") if state.runtime_present => {
                Ok(CommandOutput::exited(0, "Python 3.11.9\n"))
            }
            Some("--version") => Err(io::Error::from(io::ErrorKind::NotFound)),
            Some("-m") if state.environment_fails => Ok(CommandOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: String::from("ensurepip is not available"),
            }),
            Some("-m") => Ok(CommandOutput::exited(0, "")),
            Some("-c") => {
                let present = state.library_present
                    || (state.installer_ran && state.installer_provides_library);
                if present {
                    Ok(CommandOutput::exited(0, format!("{LIBRARY_MARKER}\n")))
                } else {
                    Ok(CommandOutput {
                        status: Some(1),
                        stdout: String::new(),
                        stderr: String::from("ModuleNotFoundError"),
                    })
                }
            }
            _ => Err(io::Error::other(format!(
                "unexpected invocation '{}'",
                invocation.display()
            ))),
        }
    }

    fn spawn_detached(&self, _invocation: &Invocation, _log: &Path) -> io::Result<u32> {
        self.journal.record(Entry::Installer);
        self.state().installer_ran = true;
        Ok(6060)
    }
}
