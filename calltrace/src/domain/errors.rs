//! Structured error types for calltrace
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Hook-path errors never reach the traced application: the public hooks
//! return `()` and fold these into counters.

use thiserror::Error;

/// Why a hook call did not record anything
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    #[error("thread was not admitted for tracing")]
    AdmissionDenied,

    #[error("hook called from inside profiler code")]
    Guarded,

    #[error("tracing is suspended")]
    Suspended,

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Failure to append a record to the event buffer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("event buffer full ({capacity} records), event dropped")]
    Overflow { capacity: usize },

    #[error("event buffer sealed while tracing is suspended")]
    Sealed,
}

/// Misuse of the suspend/resume/reset administrative operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("tracing is already suspended")]
    AlreadySuspended,

    #[error("tracing is not suspended")]
    NotSuspended,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to decode trace record: {0}")]
    Decode(#[from] calltrace_common::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
