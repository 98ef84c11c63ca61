//! Operating-system seam for spawning, probing and signalling the worker.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;
use super::command::{CommandRunner, Invocation};
use super::group::ProcessGroupId;

/// Script run by `/bin/sh -c` in the freshly created session.
///
/// After `setsid` the shell leads its own process group, so `$$` is the group
/// id. It is published through a temporary file and a rename so readers never
/// observe a partial record, then the shell replaces itself with the worker.
const WRAPPER_SCRIPT: &str = r#"handoff="$1"; log="$2"; shift 2
printf '%s\n' "$$" > "$handoff.tmp" && mv -f "$handoff.tmp" "$handoff"
exec "$@" > "$log" 2>&1 < /dev/null"#;

/// `$0` of the wrapper shell, visible in process listings.
const WRAPPER_NAME: &str = "pose-sidecar-wrapper";

/// Signals the termination sequence sends to a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// Terminate request the worker may handle (`SIGTERM`).
    Graceful,
    /// Non-ignorable kill (`SIGKILL`).
    Forceful,
}

impl TerminationSignal {
    /// Operating-system signal backing this request.
    #[must_use]
    pub const fn as_signal(self) -> Signal {
        match self {
            Self::Graceful => Signal::SIGTERM,
            Self::Forceful => Signal::SIGKILL,
        }
    }
}

/// Result of delivering a signal to a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The kernel accepted the signal for at least one group member.
    Delivered,
    /// No process in the group exists any more.
    NoSuchGroup,
}

/// Everything the isolating wrapper needs to start the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Runtime executable interpreting the entry script.
    pub runtime: PathBuf,
    /// Worker entry script.
    pub entry: PathBuf,
    /// Arguments following the entry script.
    pub arguments: Vec<String>,
    /// Directory the worker runs in.
    pub working_dir: PathBuf,
    /// Handoff record the wrapper publishes the group id to.
    pub handoff_path: PathBuf,
    /// Log file receiving all worker output.
    pub log_path: PathBuf,
}

/// Handle on the intermediate wrapper process.
///
/// The supervisor keeps the wrapper's [`Child`] so it can reap it before each
/// liveness probe; an unreaped zombie would otherwise keep the group visible.
#[derive(Debug)]
pub struct LauncherHandle {
    id: u32,
    child: Option<Child>,
}

impl LauncherHandle {
    /// Wraps a spawned wrapper process.
    #[must_use]
    pub fn from_child(child: Child) -> Self {
        Self {
            id: child.id(),
            child: Some(child),
        }
    }

    /// Handle for a launcher that cannot be reaped by this process.
    #[must_use]
    pub const fn untracked(id: u32) -> Self {
        Self { id, child: None }
    }

    /// Process id of the wrapper.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Collects the wrapper's exit status if it has finished.
    pub fn reap(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: PROCESS_TARGET,
                    launcher = self.id,
                    status = %status,
                    "reaped launcher"
                );
                self.child = None;
            }
            Ok(None) => {}
            Err(error) => {
                debug!(
                    target: PROCESS_TARGET,
                    launcher = self.id,
                    error = %error,
                    "failed to poll launcher status"
                );
            }
        }
    }
}

/// Process operations the launcher and termination sequence rely on.
pub trait ProcessHost: Send + Sync {
    /// Starts the isolating wrapper in a new session.
    fn spawn(&self, command: &LaunchCommand) -> io::Result<LauncherHandle>;

    /// Non-destructively checks whether any member of `group` exists.
    fn probe_group(&self, group: ProcessGroupId) -> io::Result<bool>;

    /// Sends `signal` to every member of `group`.
    fn signal_group(
        &self,
        group: ProcessGroupId,
        signal: TerminationSignal,
    ) -> io::Result<SignalOutcome>;

    /// Kills every process whose command line contains `pattern`. Returns
    /// whether anything matched.
    fn kill_matching(&self, pattern: &str) -> io::Result<bool>;

    /// Kills whichever processes still hold `device` open. Returns whether
    /// anything was released.
    fn release_device(&self, device: &Path) -> io::Result<bool>;
}

impl<T> ProcessHost for Arc<T>
where
    T: ProcessHost + ?Sized,
{
    fn spawn(&self, command: &LaunchCommand) -> io::Result<LauncherHandle> {
        (**self).spawn(command)
    }

    fn probe_group(&self, group: ProcessGroupId) -> io::Result<bool> {
        (**self).probe_group(group)
    }

    fn signal_group(
        &self,
        group: ProcessGroupId,
        signal: TerminationSignal,
    ) -> io::Result<SignalOutcome> {
        (**self).signal_group(group, signal)
    }

    fn kill_matching(&self, pattern: &str) -> io::Result<bool> {
        (**self).kill_matching(pattern)
    }

    fn release_device(&self, device: &Path) -> io::Result<bool> {
        (**self).release_device(device)
    }
}

/// [`ProcessHost`] backed by the local operating system.
#[derive(Clone)]
pub struct SystemProcessHost {
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
    shell: PathBuf,
}

impl SystemProcessHost {
    /// Builds a host running its cleanup helpers through `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, command_timeout: Duration) -> Self {
        Self {
            runner,
            command_timeout,
            shell: PathBuf::from("/bin/sh"),
        }
    }

    fn run_cleanup(&self, invocation: &Invocation) -> io::Result<bool> {
        let output = self.runner.run(invocation)?;
        match output.status {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            status => {
                warn!(
                    target: PROCESS_TARGET,
                    command = %invocation.display(),
                    status = ?status,
                    detail = %output.diagnostic(),
                    "cleanup helper reported a failure"
                );
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for SystemProcessHost {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SystemProcessHost")
            .field("command_timeout", &self.command_timeout)
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

impl ProcessHost for SystemProcessHost {
    fn spawn(&self, command: &LaunchCommand) -> io::Result<LauncherHandle> {
        let mut wrapper = Command::new(&self.shell);
        wrapper
            .arg("-c")
            .arg(WRAPPER_SCRIPT)
            .arg(WRAPPER_NAME)
            .arg(&command.handoff_path)
            .arg(&command.log_path)
            .arg(&command.runtime)
            .arg(&command.entry)
            .args(&command.arguments)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: `setsid` is async-signal-safe and touches no state
            // shared with the parent.
            unsafe {
                wrapper.pre_exec(|| {
                    nix::unistd::setsid()
                        .map(|_| ())
                        .map_err(io::Error::from)
                });
            }
        }
        let child = wrapper.spawn()?;
        info!(
            target: PROCESS_TARGET,
            launcher = child.id(),
            entry = %command.entry.display(),
            log = %command.log_path.display(),
            "spawned isolating wrapper"
        );
        Ok(LauncherHandle::from_child(child))
    }

    fn probe_group(&self, group: ProcessGroupId) -> io::Result<bool> {
        match killpg(Pid::from_raw(group.get()), None) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    fn signal_group(
        &self,
        group: ProcessGroupId,
        signal: TerminationSignal,
    ) -> io::Result<SignalOutcome> {
        match killpg(Pid::from_raw(group.get()), signal.as_signal()) {
            Ok(()) => Ok(SignalOutcome::Delivered),
            Err(Errno::ESRCH) => Ok(SignalOutcome::NoSuchGroup),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    fn kill_matching(&self, pattern: &str) -> io::Result<bool> {
        let invocation = Invocation::new("pkill", self.command_timeout)
            .arg("-KILL")
            .arg("-f")
            .arg(literal_pattern(pattern));
        self.run_cleanup(&invocation)
    }

    fn release_device(&self, device: &Path) -> io::Result<bool> {
        if !device.exists() {
            return Ok(false);
        }
        let invocation = Invocation::new("fuser", self.command_timeout)
            .arg("-k")
            .arg(device);
        self.run_cleanup(&invocation)
    }
}

/// Escapes extended-regex metacharacters so `pkill -f` matches `text`
/// literally.
fn literal_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if matches!(
            character,
            '\\' | '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}'
        ) {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}
