//! Validation errors raised while deriving typed views from [`crate::Config`].

use thiserror::Error;

/// Errors raised when configuration values cannot describe a valid launch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A confidence threshold fell outside `0.0..=1.0`.
    #[error("{field} must be within 0.0..=1.0 (got {value})")]
    ConfidenceOutOfRange {
        /// Offending field name.
        field: &'static str,
        /// Rejected value.
        value: f32,
    },
    /// Model complexity was not one of the supported tiers.
    #[error("model complexity must be 0, 1 or 2 (got {value})")]
    ModelComplexity {
        /// Rejected value.
        value: u8,
    },
    /// The smoothing preset is not one the worker knows.
    #[error("filter preset '{value}' must be one of responsive, balanced or smooth")]
    FilterPreset {
        /// Rejected value.
        value: String,
    },
    /// Frame skipping must process at least every frame.
    #[error("skip_frames must be at least 1")]
    SkipFrames,
    /// The data port leaves no room for the derived stream and heartbeat ports.
    #[error("port {port} leaves no room for the heartbeat port offset")]
    PortRange {
        /// Configured data port.
        port: u16,
    },
    /// The worker host must be a loopback address.
    #[error("worker host '{host}' is not a loopback address")]
    NonLoopbackHost {
        /// Configured host.
        host: String,
    },
    /// A duration that drives a polling loop was zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Offending field name.
        field: &'static str,
    },
    /// A bounded attempt budget was zero.
    #[error("{field} must allow at least one attempt")]
    ZeroAttempts {
        /// Offending field name.
        field: &'static str,
    },
    /// A path component was empty.
    #[error("{field} must not be empty")]
    EmptyPath {
        /// Offending field name.
        field: &'static str,
    },
}
