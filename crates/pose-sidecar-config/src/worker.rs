//! Launch descriptor handed to the tracking worker.
//!
//! The worker is an external process; this module only has to describe it
//! faithfully. [`WorkerConfig`] is the validated snapshot taken from
//! [`Config`] and [`WorkerConfig::launch_arguments`] renders it as the
//! command-line contract the worker parses.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::Config;
use crate::defaults::{HEARTBEAT_PORT_OFFSET, STREAM_PORT_OFFSET};
use crate::error::ConfigError;

/// How the host application decides when the worker launches.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LaunchTrigger {
    /// Launch only when the host explicitly asks for tracking.
    #[default]
    OnDemand,
    /// Launch as soon as the host reports it is ready.
    AutoStart,
}

/// Landmark smoothing presets the worker's filter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FilterPreset {
    /// Least lag, most jitter.
    Responsive,
    /// Default trade-off.
    Balanced,
    /// Least jitter, most lag.
    Smooth,
}

impl FilterPreset {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::FilterPreset {
                value: value.to_owned(),
            })
    }
}

/// Pose model tiers understood by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelComplexity {
    /// Fastest, least accurate model.
    Lite,
    /// Balanced model.
    Full,
    /// Most accurate, slowest model.
    Heavy,
}

impl ModelComplexity {
    /// Numeric tier passed on the worker command line.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Lite => 0,
            Self::Full => 1,
            Self::Heavy => 2,
        }
    }
}

impl TryFrom<u8> for ModelComplexity {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Lite),
            1 => Ok(Self::Full),
            2 => Ok(Self::Heavy),
            value => Err(ConfigError::ModelComplexity { value }),
        }
    }
}

impl fmt::Display for ModelComplexity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.as_u8())
    }
}

/// Frame acquisition settings forwarded to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Capture frame-rate cap.
    pub max_fps: u32,
    /// Capture width in pixels.
    pub width: u32,
    /// Capture height in pixels.
    pub height: u32,
    /// Process every Nth frame.
    pub skip_frames: u32,
    /// Capture on a dedicated thread.
    pub threaded: bool,
}

/// Validated snapshot of everything the worker is launched with.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Camera device index.
    pub camera_index: u32,
    /// Loopback host receiving tracking datagrams.
    pub host: IpAddr,
    /// Data port receiving tracking datagrams.
    pub port: u16,
    /// Minimum detection confidence.
    pub detection_confidence: f32,
    /// Minimum tracking confidence.
    pub tracking_confidence: f32,
    /// Pose model tier.
    pub model_complexity: ModelComplexity,
    /// Frame acquisition settings.
    pub capture: CaptureSettings,
    /// Emit JSON payloads rather than the binary encoding.
    pub json_protocol: bool,
    /// Serve the MJPEG preview stream.
    pub streaming: bool,
    /// Smoothing preset, or `None` when filtering is disabled.
    pub filter_preset: Option<FilterPreset>,
}

impl WorkerConfig {
    /// Validates the worker-facing fields of `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let detection_confidence =
            confidence("detection_confidence", config.detection_confidence)?;
        let tracking_confidence = confidence("tracking_confidence", config.tracking_confidence)?;
        let model_complexity = ModelComplexity::try_from(config.model_complexity)?;
        if config.skip_frames == 0 {
            return Err(ConfigError::SkipFrames);
        }
        if config.port.checked_add(HEARTBEAT_PORT_OFFSET).is_none() {
            return Err(ConfigError::PortRange { port: config.port });
        }
        let host = loopback_host(&config.host)?;
        let filter_preset = FilterPreset::parse(&config.filter_preset)?;
        Ok(Self {
            camera_index: config.camera_index,
            host,
            port: config.port,
            detection_confidence,
            tracking_confidence,
            model_complexity,
            capture: CaptureSettings {
                max_fps: config.max_fps,
                width: config.frame_width,
                height: config.frame_height,
                skip_frames: config.skip_frames,
                threaded: config.threaded_capture,
            },
            json_protocol: config.json_protocol,
            streaming: config.enable_streaming,
            filter_preset: config.enable_filter.then_some(filter_preset),
        })
    }

    /// Port of the worker's MJPEG preview stream.
    #[must_use]
    pub const fn stream_port(&self) -> u16 {
        self.port.saturating_add(STREAM_PORT_OFFSET)
    }

    /// Port the worker listens on for heartbeat datagrams.
    #[must_use]
    pub const fn heartbeat_port(&self) -> u16 {
        self.port.saturating_add(HEARTBEAT_PORT_OFFSET)
    }

    /// Loopback address heartbeat datagrams are sent to.
    #[must_use]
    pub const fn heartbeat_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.heartbeat_port())
    }

    /// Device node of the configured camera.
    #[must_use]
    pub fn camera_device(&self) -> PathBuf {
        PathBuf::from(format!("/dev/video{}", self.camera_index))
    }

    /// Renders the worker command-line arguments that follow the entry script.
    #[must_use]
    pub fn launch_arguments(&self) -> Vec<String> {
        let mut arguments = vec![
            String::from("--camera"),
            self.camera_index.to_string(),
            String::from("--port"),
            self.port.to_string(),
            String::from("--host"),
            self.host.to_string(),
            String::from("--detection-confidence"),
            self.detection_confidence.to_string(),
            String::from("--tracking-confidence"),
            self.tracking_confidence.to_string(),
            String::from("--model-complexity"),
            self.model_complexity.to_string(),
            String::from("--max-fps"),
            self.capture.max_fps.to_string(),
            String::from("--width"),
            self.capture.width.to_string(),
            String::from("--height"),
            self.capture.height.to_string(),
            String::from("--skip-frames"),
            self.capture.skip_frames.to_string(),
        ];
        arguments.push(String::from(if self.capture.threaded {
            "--threaded-capture"
        } else {
            "--no-threaded-capture"
        }));
        if self.json_protocol {
            arguments.push(String::from("--json-protocol"));
        }
        if self.streaming {
            arguments.push(String::from("--stream"));
            arguments.push(String::from("--stream-port"));
            arguments.push(self.stream_port().to_string());
        }
        match self.filter_preset {
            Some(preset) => {
                arguments.push(String::from("--use-filter"));
                arguments.push(String::from("--filter-preset"));
                arguments.push(preset.to_string());
            }
            None => arguments.push(String::from("--no-filter")),
        }
        arguments.push(String::from("--heartbeat-port"));
        arguments.push(self.heartbeat_port().to_string());
        arguments
    }
}

fn confidence(field: &'static str, value: f32) -> Result<f32, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::ConfidenceOutOfRange { field, value })
    }
}

fn loopback_host(host: &str) -> Result<IpAddr, ConfigError> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    match host.parse::<IpAddr>() {
        Ok(address) if address.is_loopback() => Ok(address),
        _ => Err(ConfigError::NonLoopbackHost {
            host: host.to_owned(),
        }),
    }
}
