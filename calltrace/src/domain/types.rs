//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent passing a thread number where a method id
//! is expected, and make hook signatures more expressive.

use std::fmt;

/// Method id
///
/// Assigned by the instrumentation when it injects hook calls. The id space
/// is 16 bits wide; the activation table covers all of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u16);

impl MethodId {
    /// Number of distinct method ids
    pub const SPACE: usize = 1 << 16;

    /// Index into per-method tables
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M#{}", self.0)
    }
}

impl From<u16> for MethodId {
    fn from(id: u16) -> Self {
        MethodId(id)
    }
}

/// Thread number
///
/// Compact id handed out when a thread is admitted, starting at 1. This is
/// NOT the OS thread id; 0 is reserved for records that concern all threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadNo(pub u32);

impl ThreadNo {
    /// Placeholder used by suspend/resume markers
    pub const ALL: ThreadNo = ThreadNo(calltrace_common::NO_THREAD);
}

impl fmt::Display for ThreadNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T#{}", self.0)
    }
}

/// Timestamp in nanoseconds
///
/// Monotonic, relative to the tracer's epoch (the instant it was created).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Convert to seconds (f64)
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Convert to microseconds (f64), the unit of Chrome trace timestamps
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_micros_f64(self) -> f64 {
        self.0 as f64 / 1_000.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_seconds())
    }
}
