//! Shared configuration for the pose-tracking sidecar supervisor.
//!
//! Configuration is layered through [`ortho_config`]: built-in defaults, an
//! optional TOML file (`--config-path`), `POSE_SIDECAR_*` environment
//! variables and finally command-line flags. The loaded [`Config`] is a flat
//! record; the typed views consumed by the supervisor ([`WorkerConfig`],
//! [`SupervisorTimings`], [`Toolchain`] and [`RuntimePaths`]) are derived from
//! it and validated on construction.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod error;
mod logging;
mod runtime;
mod timings;
mod toolchain;
mod worker;

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_PORT, HEARTBEAT_MARKER, HEARTBEAT_PORT_OFFSET,
    STREAM_PORT_OFFSET, default_log_filter, default_log_filter_string, default_log_format,
    default_runtime_directory,
};
pub use error::ConfigError;
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimePaths, RuntimePathsError};
pub use timings::SupervisorTimings;
pub use toolchain::Toolchain;
pub use worker::{CaptureSettings, FilterPreset, LaunchTrigger, ModelComplexity, WorkerConfig};

/// Layered configuration shared by the supervisor library and binary.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "POSE_SIDECAR")]
pub struct Config {
    /// `tracing_subscriber::EnvFilter` expression.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Directory holding the handoff record and worker logs.
    #[serde(default)]
    pub runtime_dir: Option<Utf8PathBuf>,
    /// Project directory of the tracking worker.
    #[serde(default = "defaults::default_worker_dir")]
    pub worker_dir: Utf8PathBuf,
    /// Worker entry script, relative to `worker_dir`.
    #[serde(default = "defaults::default_worker_entry")]
    pub worker_entry: String,
    /// Isolated runtime environment, relative to `worker_dir`.
    #[serde(default = "defaults::default_venv_dir")]
    pub venv_dir: String,
    /// System-wide runtime used when no isolated environment exists.
    #[serde(default = "defaults::default_system_runtime")]
    pub system_runtime: String,
    /// Requirements descriptor handed to the package installer.
    #[serde(default = "defaults::default_requirements_file")]
    pub requirements_file: String,
    /// Library whose import proves the worker's prerequisites are present.
    #[serde(default = "defaults::default_required_library")]
    pub required_library: String,
    /// Camera device index.
    #[serde(default = "defaults::default_camera_index")]
    pub camera_index: u32,
    /// Host the worker sends tracking datagrams to.
    #[serde(default = "defaults::default_host")]
    pub host: String,
    /// Worker data port.
    #[serde(default = "defaults::default_port")]
    pub port: u16,
    /// Minimum pose detection confidence.
    #[serde(default = "defaults::default_confidence")]
    pub detection_confidence: f32,
    /// Minimum pose tracking confidence.
    #[serde(default = "defaults::default_confidence")]
    pub tracking_confidence: f32,
    /// Model complexity: 0 lite, 1 full, 2 heavy.
    #[serde(default = "defaults::default_model_complexity")]
    pub model_complexity: u8,
    /// Capture frame-rate cap.
    #[serde(default = "defaults::default_max_fps")]
    pub max_fps: u32,
    /// Capture width in pixels.
    #[serde(default = "defaults::default_frame_width")]
    pub frame_width: u32,
    /// Capture height in pixels.
    #[serde(default = "defaults::default_frame_height")]
    pub frame_height: u32,
    /// Process every Nth captured frame.
    #[serde(default = "defaults::default_skip_frames")]
    pub skip_frames: u32,
    /// Capture frames on a dedicated worker thread.
    #[serde(default = "defaults::enabled")]
    pub threaded_capture: bool,
    /// Use the JSON payload encoding instead of the binary one.
    #[serde(default = "defaults::disabled")]
    pub json_protocol: bool,
    /// Serve an MJPEG preview stream on `port + 1`.
    #[serde(default = "defaults::disabled")]
    pub enable_streaming: bool,
    /// Smooth landmarks inside the worker.
    #[serde(default = "defaults::enabled")]
    pub enable_filter: bool,
    /// Smoothing preset name.
    #[serde(default = "defaults::default_filter_preset")]
    pub filter_preset: String,
    /// Whether the worker launches on demand or as soon as the host is ready.
    #[serde(default = "defaults::default_launch_trigger")]
    pub launch_trigger: LaunchTrigger,
    /// Force-release the camera device as the last teardown step.
    #[serde(default = "defaults::enabled")]
    pub release_camera_device: bool,
    /// Heartbeat period in milliseconds.
    #[serde(default = "defaults::default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Delay before the handoff record is read.
    #[serde(default = "defaults::default_handoff_delay_ms")]
    pub handoff_delay_ms: u64,
    /// Delay before the post-launch liveness probe.
    #[serde(default = "defaults::default_startup_grace_ms")]
    pub startup_grace_ms: u64,
    /// Delay between silencing the heartbeat and the graceful signal.
    #[serde(default = "defaults::default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Liveness poll interval after the graceful signal.
    #[serde(default = "defaults::default_terminate_poll_ms")]
    pub terminate_poll_ms: u64,
    /// Bounded wait after the graceful signal.
    #[ortho_config(cli_short = 'x')]
    #[serde(default = "defaults::default_terminate_wait_ms")]
    pub terminate_wait_ms: u64,
    /// Delay after each forceful signal.
    #[serde(default = "defaults::default_kill_settle_ms")]
    pub kill_settle_ms: u64,
    /// Number of forceful signals sent before giving up.
    #[serde(default = "defaults::default_kill_attempts")]
    pub kill_attempts: u32,
    /// Timeout applied to each probe or environment-creation command.
    #[serde(default = "defaults::default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Attempts allowed for a probe invocation that fails to run.
    #[serde(default = "defaults::default_probe_attempts")]
    pub probe_attempts: u32,
    /// Wait window granted to the detached package installer.
    #[ortho_config(cli_short = 'X')]
    #[serde(default = "defaults::default_install_wait_ms")]
    pub install_wait_ms: u64,
    /// Library re-check interval while the installer runs.
    #[serde(default = "defaults::default_install_poll_ms")]
    pub install_poll_ms: u64,
}

impl Config {
    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Configured launch trigger.
    #[must_use]
    pub const fn launch_trigger(&self) -> LaunchTrigger {
        self.launch_trigger
    }

    /// Directory for runtime artefacts, falling back to the platform default.
    #[must_use]
    pub fn runtime_dir(&self) -> Utf8PathBuf {
        self.runtime_dir
            .clone()
            .unwrap_or_else(default_runtime_directory)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            runtime_dir: None,
            worker_dir: defaults::default_worker_dir(),
            worker_entry: defaults::default_worker_entry(),
            venv_dir: defaults::default_venv_dir(),
            system_runtime: defaults::default_system_runtime(),
            requirements_file: defaults::default_requirements_file(),
            required_library: defaults::default_required_library(),
            camera_index: defaults::default_camera_index(),
            host: defaults::default_host(),
            port: defaults::default_port(),
            detection_confidence: defaults::default_confidence(),
            tracking_confidence: defaults::default_confidence(),
            model_complexity: defaults::default_model_complexity(),
            max_fps: defaults::default_max_fps(),
            frame_width: defaults::default_frame_width(),
            frame_height: defaults::default_frame_height(),
            skip_frames: defaults::default_skip_frames(),
            threaded_capture: defaults::enabled(),
            json_protocol: defaults::disabled(),
            enable_streaming: defaults::disabled(),
            enable_filter: defaults::enabled(),
            filter_preset: defaults::default_filter_preset(),
            launch_trigger: defaults::default_launch_trigger(),
            release_camera_device: defaults::enabled(),
            heartbeat_interval_ms: defaults::default_heartbeat_interval_ms(),
            handoff_delay_ms: defaults::default_handoff_delay_ms(),
            startup_grace_ms: defaults::default_startup_grace_ms(),
            shutdown_grace_ms: defaults::default_shutdown_grace_ms(),
            terminate_poll_ms: defaults::default_terminate_poll_ms(),
            terminate_wait_ms: defaults::default_terminate_wait_ms(),
            kill_settle_ms: defaults::default_kill_settle_ms(),
            kill_attempts: defaults::default_kill_attempts(),
            command_timeout_ms: defaults::default_command_timeout_ms(),
            probe_attempts: defaults::default_probe_attempts(),
            install_wait_ms: defaults::default_install_wait_ms(),
            install_poll_ms: defaults::default_install_poll_ms(),
        }
    }
}
