//! Counters for everything the hooks did not do
//!
//! Hooks never report errors to the traced application; each refusal or
//! dropped event lands in one of these counters instead.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{BufferError, HookError};

#[derive(Debug, Default)]
pub struct TracerStats {
    events_written: AtomicU64,
    events_dropped: AtomicU64,
    events_sealed_out: AtomicU64,
    admissions_denied: AtomicU64,
    guarded_calls: AtomicU64,
    suspended_calls: AtomicU64,
    threads_registered: AtomicU64,
}

/// Plain copy of [`TracerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Records accepted by the buffer
    pub events_written: u64,
    /// Records lost to a full buffer
    pub events_dropped: u64,
    /// Records refused because the buffer was sealed by a suspension
    pub events_sealed_out: u64,
    /// Hook calls from threads refused admission
    pub admissions_denied: u64,
    /// Hook calls made from inside profiler code
    pub guarded_calls: u64,
    /// Hook calls made while tracing was suspended
    pub suspended_calls: u64,
    pub threads_registered: u64,
}

impl TracerStats {
    pub fn record_written(&self) {
        self.events_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registration(&self) {
        self.threads_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, err: HookError) {
        let counter = match err {
            HookError::AdmissionDenied => &self.admissions_denied,
            HookError::Guarded => &self.guarded_calls,
            HookError::Suspended => &self.suspended_calls,
            HookError::Buffer(BufferError::Overflow { .. }) => &self.events_dropped,
            HookError::Buffer(BufferError::Sealed) => &self.events_sealed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_written: self.events_written.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_sealed_out: self.events_sealed_out.load(Ordering::Relaxed),
            admissions_denied: self.admissions_denied.load(Ordering::Relaxed),
            guarded_calls: self.guarded_calls.load(Ordering::Relaxed),
            suspended_calls: self.suspended_calls.load(Ordering::Relaxed),
            threads_registered: self.threads_registered.load(Ordering::Relaxed),
        }
    }
}
