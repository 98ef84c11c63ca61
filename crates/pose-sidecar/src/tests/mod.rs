//! Test suites for the pose-sidecar supervisor.

pub(crate) mod support;
