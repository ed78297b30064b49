use std::fmt;
use std::time::{Duration, Instant};

/// Identifier of a logical stream endpoint on the device.
///
/// A transport is bound to one local `EpId` at construction and keeps it
/// for its entire lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpId(u16);

impl EpId {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}

impl From<u16> for EpId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for EpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epid:{}", self.0)
    }
}

/// Bound on how long an acquire operation may wait for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Attempt once and return immediately.
    NoWait,
    /// Block until a buffer becomes available, however long that takes.
    Forever,
    /// Wait at most this long.
    After(Duration),
}

impl Timeout {
    /// Map the signed-millisecond convention used on the wire-facing C
    /// APIs: negative blocks forever, zero polls once, positive is a
    /// bound in milliseconds.
    pub fn from_millis(ms: i32) -> Self {
        match ms {
            ms if ms < 0 => Timeout::Forever,
            0 => Timeout::NoWait,
            ms => Timeout::After(Duration::from_millis(ms as u64)),
        }
    }

    /// Absolute deadline for this timeout, if it has one.
    pub(crate) fn deadline(self) -> Option<Instant> {
        match self {
            Timeout::NoWait | Timeout::Forever => None,
            Timeout::After(d) => Some(Instant::now() + d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::After(d)
    }
}
