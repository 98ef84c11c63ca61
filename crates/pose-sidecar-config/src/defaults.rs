use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::logging::LogFormat;
use crate::worker::LaunchTrigger;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default UDP data port the worker streams tracking payloads to.
pub const DEFAULT_PORT: u16 = 4242;

/// Default loopback host handed to the worker.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Offset from the data port of the worker's MJPEG preview stream.
pub const STREAM_PORT_OFFSET: u16 = 1;

/// Offset from the data port of the heartbeat listener inside the worker.
pub const HEARTBEAT_PORT_OFFSET: u16 = 2;

/// Marker byte carried by every heartbeat datagram.
pub const HEARTBEAT_MARKER: u8 = b'H';

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

pub(crate) fn default_worker_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("python_mediapipe")
}

pub(crate) fn default_worker_entry() -> String {
    String::from("main.py")
}

pub(crate) fn default_venv_dir() -> String {
    String::from("venv")
}

pub(crate) fn default_system_runtime() -> String {
    String::from("python3")
}

pub(crate) fn default_requirements_file() -> String {
    String::from("requirements.txt")
}

pub(crate) fn default_required_library() -> String {
    String::from("mediapipe")
}

pub(crate) const fn default_camera_index() -> u32 {
    0
}

pub(crate) fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

pub(crate) const fn default_port() -> u16 {
    DEFAULT_PORT
}

pub(crate) const fn default_confidence() -> f32 {
    0.3
}

pub(crate) const fn default_model_complexity() -> u8 {
    0
}

pub(crate) const fn default_max_fps() -> u32 {
    60
}

pub(crate) const fn default_frame_width() -> u32 {
    640
}

pub(crate) const fn default_frame_height() -> u32 {
    480
}

pub(crate) const fn default_skip_frames() -> u32 {
    1
}

pub(crate) const fn enabled() -> bool {
    true
}

pub(crate) const fn disabled() -> bool {
    false
}

pub(crate) fn default_filter_preset() -> String {
    String::from("balanced")
}

pub(crate) fn default_launch_trigger() -> LaunchTrigger {
    LaunchTrigger::OnDemand
}

pub(crate) const fn default_heartbeat_interval_ms() -> u64 {
    500
}

pub(crate) const fn default_handoff_delay_ms() -> u64 {
    300
}

pub(crate) const fn default_startup_grace_ms() -> u64 {
    2_500
}

pub(crate) const fn default_shutdown_grace_ms() -> u64 {
    1_000
}

pub(crate) const fn default_terminate_poll_ms() -> u64 {
    100
}

pub(crate) const fn default_terminate_wait_ms() -> u64 {
    3_000
}

pub(crate) const fn default_kill_settle_ms() -> u64 {
    500
}

pub(crate) const fn default_kill_attempts() -> u32 {
    2
}

pub(crate) const fn default_command_timeout_ms() -> u64 {
    15_000
}

pub(crate) const fn default_probe_attempts() -> u32 {
    2
}

pub(crate) const fn default_install_wait_ms() -> u64 {
    180_000
}

pub(crate) const fn default_install_poll_ms() -> u64 {
    2_000
}

/// Computes the default directory for runtime artefacts.
///
/// Prefers the per-user runtime directory and falls back to a uid-namespaced
/// directory under the system temporary directory.
pub fn default_runtime_directory() -> Utf8PathBuf {
    default_runtime_directory_inner()
}

#[cfg(unix)]
fn default_runtime_directory_inner() -> Utf8PathBuf {
    if let Some(mut dir) = runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        dir.push("pose-sidecar");
        return dir;
    }
    let mut dir = fallback_base_directory();
    dir.push("pose-sidecar");
    dir.push(user_namespace());
    dir
}

#[cfg(not(unix))]
fn default_runtime_directory_inner() -> Utf8PathBuf {
    let mut dir = fallback_base_directory();
    dir.push("pose-sidecar");
    dir
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}
