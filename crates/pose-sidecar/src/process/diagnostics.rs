//! Extracts the tail of the worker's redirected output.

use std::fs;
use std::path::Path;

/// Number of log lines attached to a failed launch.
pub(crate) const LOG_TAIL_LINES: usize = 20;

/// Returns at most `lines` trailing lines of the log at `path`.
///
/// Reading failures are folded into the returned text.
pub(crate) fn log_tail(path: &Path, lines: usize) -> String {
    match fs::read(path) {
        Ok(bytes) => tail_lines(&String::from_utf8_lossy(&bytes), lines),
        Err(error) => format!("worker log '{}' unavailable: {error}", path.display()),
    }
}

fn tail_lines(contents: &str, lines: usize) -> String {
    let collected: Vec<&str> = contents.lines().rev().take(lines).collect();
    collected.into_iter().rev().collect::<Vec<_>>().join("\n")
}
