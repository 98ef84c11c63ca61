//! Validated process-group identity.

use std::fmt;

/// Identifier of the process group led by the launched worker's wrapper.
///
/// Values `<= 1` are unrepresentable: group `0` addresses the caller's own
/// group and `1` belongs to init, so signalling either would reach processes
/// the supervisor does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGroupId(i32);

impl ProcessGroupId {
    /// Accepts `raw` only when it can safely be signalled as a group.
    #[must_use]
    pub const fn new(raw: i32) -> Option<Self> {
        if raw > 1 { Some(Self(raw)) } else { None }
    }

    /// Converts an unsigned process id, rejecting values outside `2..=i32::MAX`.
    #[must_use]
    pub fn from_u32(raw: u32) -> Option<Self> {
        i32::try_from(raw).ok().and_then(Self::new)
    }

    /// Raw group id.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessGroupId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
