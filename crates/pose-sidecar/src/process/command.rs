//! Bounded-duration command invocation.
//!
//! Every external command the supervisor runs (runtime probes, environment
//! creation, pattern-based cleanup) goes through [`CommandRunner`]. The runner
//! owns the timeout, so async callers hand invocations to
//! `tokio::task::spawn_blocking` without wrapping them in a second timer.

use std::ffi::{OsStr, OsString};
use std::fs::OpenOptions;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::PROCESS_TARGET;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A single external command with its own deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    arguments: Vec<OsString>,
    timeout: Duration,
}

impl Invocation {
    /// Builds an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            arguments: Vec::new(),
            timeout,
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, argument: impl AsRef<OsStr>) -> Self {
        self.arguments.push(argument.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.arguments
            .extend(arguments.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &Path {
        self.program.as_path()
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        self.arguments.as_slice()
    }

    /// Deadline applied to [`CommandRunner::run`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Renders the invocation for log fields.
    #[must_use]
    pub fn display(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for argument in &self.arguments {
            rendered.push(' ');
            rendered.push_str(&argument.to_string_lossy());
        }
        rendered
    }
}

/// Captured result of a completed invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the command was terminated by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Builds an output with the given exit code and standard output.
    #[must_use]
    pub fn exited(status: i32, stdout: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    /// Trimmed standard error, falling back to standard output.
    #[must_use]
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Runs external commands on behalf of the supervisor.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation` to completion, capturing its output.
    ///
    /// Returns [`io::ErrorKind::TimedOut`] when the deadline elapses; the
    /// command is killed before the error is returned.
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;

    /// Spawns `invocation` without observing its exit, sending all of its
    /// output to `log`. Returns the spawned process id.
    fn spawn_detached(&self, invocation: &Invocation, log: &Path) -> io::Result<u32>;
}

impl<T> CommandRunner for Arc<T>
where
    T: CommandRunner + ?Sized,
{
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        (**self).run(invocation)
    }

    fn spawn_detached(&self, invocation: &Invocation, log: &Path) -> io::Result<u32> {
        (**self).spawn_detached(invocation, log)
    }
}

/// Runs commands through [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    /// Builds a new runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let mut child = Command::new(invocation.program())
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = wait_with_deadline(&mut child, invocation)?;
        Ok(CommandOutput {
            status: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }

    fn spawn_detached(&self, invocation: &Invocation, log: &Path) -> io::Result<u32> {
        let output = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log)?;
        let errors = output.try_clone()?;
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::from(errors));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(
            target: PROCESS_TARGET,
            pid,
            command = %invocation.display(),
            log = %log.display(),
            "spawned detached command"
        );
        // Reaped in the background so a finished installer never lingers as
        // a zombie.
        thread::spawn(move || child.wait());
        Ok(pid)
    }
}

type Drain = Option<thread::JoinHandle<String>>;

fn drain<R>(stream: Option<R>) -> Drain
where
    R: Read + Send + 'static,
{
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(error) = stream.read_to_end(&mut buffer) {
                debug!(
                    target: PROCESS_TARGET,
                    error = %error,
                    "failed to read command output"
                );
            }
            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

fn collect(handle: Drain) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn wait_with_deadline(child: &mut Child, invocation: &Invocation) -> io::Result<ExitStatus> {
    let deadline = Instant::now() + invocation.timeout();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            if let Err(error) = child.kill() {
                warn!(
                    target: PROCESS_TARGET,
                    command = %invocation.display(),
                    error = %error,
                    "failed to kill timed-out command"
                );
            }
            // Reap so the killed command does not linger as a zombie.
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!(
                    "'{}' did not finish within {} ms",
                    invocation.display(),
                    invocation.timeout().as_millis()
                ),
            ));
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}
