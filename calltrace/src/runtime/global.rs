//! Process-wide tracer
//!
//! Injected hook calls take nothing but a raw method id, so they need a tracer
//! reachable without a handle. [`install`] sets it once; until then every hook
//! here is a no-op.

use std::sync::{Arc, OnceLock};

use calltrace_common::ReturnValue;

use super::tracer::Tracer;
use crate::domain::MethodId;

static TRACER: OnceLock<Arc<Tracer>> = OnceLock::new();

/// Install the process-wide tracer.
///
/// # Errors
///
/// Hands the tracer back if one was already installed.
pub fn install(tracer: Arc<Tracer>) -> Result<(), Arc<Tracer>> {
    TRACER.set(tracer)
}

/// The installed tracer, if any
#[must_use]
pub fn tracer() -> Option<&'static Arc<Tracer>> {
    TRACER.get()
}

#[inline]
pub fn root_entry(method: u16) {
    if let Some(t) = TRACER.get() {
        t.root_entry(MethodId(method));
    }
}

#[inline]
pub fn root_exit(method: u16) {
    if let Some(t) = TRACER.get() {
        t.root_exit(MethodId(method));
    }
}

#[inline]
pub fn root_exit_with_value(method: u16, ret: ReturnValue) {
    if let Some(t) = TRACER.get() {
        t.root_exit_with_value(MethodId(method), ret);
    }
}

#[inline]
pub fn method_entry(method: u16) {
    if let Some(t) = TRACER.get() {
        t.method_entry(MethodId(method));
    }
}

#[inline]
pub fn method_exit(method: u16) {
    if let Some(t) = TRACER.get() {
        t.method_exit(MethodId(method));
    }
}

#[inline]
pub fn method_exit_with_value(method: u16, ret: ReturnValue) {
    if let Some(t) = TRACER.get() {
        t.method_exit_with_value(MethodId(method), ret);
    }
}

#[inline]
pub fn marker_entry(method: u16) {
    if let Some(t) = TRACER.get() {
        t.marker_entry(MethodId(method));
    }
}

#[inline]
pub fn marker_exit(method: u16) {
    if let Some(t) = TRACER.get() {
        t.marker_exit(MethodId(method));
    }
}

#[inline]
pub fn marker_exit_with_value(method: u16, ret: ReturnValue) {
    if let Some(t) = TRACER.get() {
        t.marker_exit_with_value(MethodId(method), ret);
    }
}

/// RAII pairing of a method entry with its exit
///
/// ```ignore
/// fn parse() {
///     let _frame = calltrace::runtime::global::MethodFrame::enter(42);
///     // ...
/// }
/// ```
#[must_use = "the exit hook fires when the frame is dropped"]
pub struct MethodFrame {
    method: u16,
}

impl MethodFrame {
    pub fn enter(method: u16) -> Self {
        method_entry(method);
        Self { method }
    }
}

impl Drop for MethodFrame {
    fn drop(&mut self) {
        method_exit(self.method);
    }
}
