//! Domain model for calltrace
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod event;
pub mod types;

// Re-export common types for convenience
pub use types::{MethodId, ThreadNo, Timestamp};

pub use errors::{BufferError, ConfigError, ControlError, ExportError, HookError};
pub use event::Event;
