//! Tracer configuration
//!
//! Consumed once when a [`Tracer`](crate::runtime::Tracer) is built, and
//! partially again by `reset_all` through [`ResetParams`]. Can be loaded from a
//! JSON file; missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::ConfigError;

/// Default number of threads admitted for tracing
pub const DEFAULT_PROFILED_THREADS: u32 = 64;

/// Default event buffer capacity, in records (24 bytes each)
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracerConfig {
    /// How many distinct threads may ever be registered (until the next reset)
    pub profiled_threads_allowed: u32,

    /// Frames deeper than this still count towards the logical stack but are not recorded
    pub stack_depth_limit: u32,

    /// Attach return values to exit events
    pub capture_return_values: bool,

    /// Event buffer capacity in records
    pub buffer_capacity: usize,

    /// Call the first-invoke handler when a method fires for the first time
    pub expand_on_first_invoke: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            profiled_threads_allowed: DEFAULT_PROFILED_THREADS,
            stack_depth_limit: u32::MAX,
            capture_return_values: false,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            expand_on_first_invoke: true,
        }
    }
}

impl TracerConfig {
    /// Load from a JSON file and validate
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON for this
    /// struct, or fails [`TracerConfig::validate`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero buffer capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid("buffer_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Parameters for a `reset_all` that restores this configuration
    #[must_use]
    pub fn reset_params(&self) -> ResetParams {
        ResetParams {
            thread_slots: self.profiled_threads_allowed,
            buffer_capacity: self.buffer_capacity,
            stack_depth_limit: self.stack_depth_limit,
        }
    }
}

/// Arguments of the administrative `reset_all` operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetParams {
    pub thread_slots: u32,
    pub buffer_capacity: usize,
    pub stack_depth_limit: u32,
}
