//! # Tracer
//!
//! Owns every piece of shared tracing state and the administrative
//! operations on it. The hook entry points live in [`super::hooks`].
//!
//! ## Lifecycle
//!
//! ```text
//!   new(config) ──► hooks running ──► suspend_all() ──► reset_all(params) ──► resume_all()
//!                        ▲                 │                                     │
//!                        └─────────────────┴──────────── resume_all() ◄──────────┘
//! ```
//!
//! `reset_all` is only accepted while suspended: it destroys every thread slot,
//! clears the activation table, refills admission and resizes the buffer.

use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use calltrace_common::{encode, EventKind, ReturnValue, NO_METHOD, NO_THREAD};

use super::activation::{FirstInvokeHandler, MethodActivationTable};
use super::admission::AdmissionController;
use super::buffer::{BufferSignal, Drained, EventBuffer};
use super::registry::{Membership, ThreadRegistry};
use super::stats::{StatsSnapshot, TracerStats};
use super::suspend::SuspendBarrier;
use super::thread_state::{ThreadSnapshot, ThreadState};
use crate::config::{ResetParams, TracerConfig};
use crate::domain::{ConfigError, ControlError, HookError, MethodId, ThreadNo};

pub struct Tracer {
    pub(super) capture_return_values: bool,
    pub(super) expand_on_first_invoke: bool,
    pub(super) stack_depth_limit: AtomicU32,
    pub(super) activation: MethodActivationTable,
    pub(super) admission: AdmissionController,
    pub(super) buffer: EventBuffer,
    pub(super) barrier: SuspendBarrier,
    pub(super) registry: ThreadRegistry,
    pub(super) stats: TracerStats,
    first_invoke: Option<Arc<dyn FirstInvokeHandler>>,
    started: Instant,
}

impl Tracer {
    /// Build a tracer from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration fails validation.
    pub fn new(config: &TracerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(
            "tracer: {} thread slots, depth limit {}, buffer {} records",
            config.profiled_threads_allowed, config.stack_depth_limit, config.buffer_capacity
        );

        Ok(Self {
            capture_return_values: config.capture_return_values,
            expand_on_first_invoke: config.expand_on_first_invoke,
            stack_depth_limit: AtomicU32::new(config.stack_depth_limit),
            activation: MethodActivationTable::new(),
            admission: AdmissionController::new(config.profiled_threads_allowed),
            buffer: EventBuffer::new(config.buffer_capacity),
            barrier: SuspendBarrier::new(),
            registry: ThreadRegistry::new(),
            stats: TracerStats::default(),
            first_invoke: None,
            started: Instant::now(),
        })
    }

    /// Install the instrumentation callback for first invocations.
    #[must_use]
    pub fn with_first_invoke_handler(mut self, handler: Arc<dyn FirstInvokeHandler>) -> Self {
        self.first_invoke = Some(handler);
        self
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Pause all instrumentation.
    ///
    /// Every registered thread gets its guard bumped and the buffer is sealed
    /// behind a `THREADS_SUSPENDED` record. Hooks already past their entry
    /// check still finish and keep their records.
    ///
    /// # Errors
    ///
    /// [`ControlError::AlreadySuspended`] if tracing is already suspended.
    pub fn suspend_all(&self) -> Result<(), ControlError> {
        let threads = self.registry.slots();
        let count = threads.len();
        self.barrier.suspend(threads, |epoch| {
            self.buffer.seal_with(self.marker(EventKind::ThreadsSuspended), epoch);
        })?;
        debug!("tracing suspended ({count} threads)");
        Ok(())
    }

    /// Undo [`suspend_all`](Self::suspend_all), writing `THREADS_RESUMED`.
    ///
    /// # Errors
    ///
    /// [`ControlError::NotSuspended`] without a prior suspend; nothing changes.
    pub fn resume_all(&self) -> Result<(), ControlError> {
        self.barrier.resume(|| {
            self.buffer.unseal_with(self.marker(EventKind::ThreadsResumed));
        })?;
        debug!("tracing resumed");
        Ok(())
    }

    /// Forget all threads and activations and reconfigure limits.
    ///
    /// # Errors
    ///
    /// [`ControlError::NotSuspended`] unless called between `suspend_all` and `resume_all`.
    pub fn reset_all(&self, params: ResetParams) -> Result<(), ControlError> {
        if !self.barrier.is_suspended() {
            return Err(ControlError::NotSuspended);
        }
        if params.buffer_capacity == 0 {
            warn!("reset_all with zero buffer capacity: every event will be dropped");
        }

        self.activation.clear();
        self.registry.clear();
        self.admission.reset(params.thread_slots);
        self.buffer.reset(params.buffer_capacity);
        self.stack_depth_limit.store(params.stack_depth_limit, Ordering::Release);

        info!(
            "tracer reset: {} thread slots, depth limit {}, buffer {} records",
            params.thread_slots, params.stack_depth_limit, params.buffer_capacity
        );
        Ok(())
    }

    /// Exclude the calling thread from tracing; used by the collector thread.
    pub fn mark_current_thread_internal(&self) {
        self.registry.mark_current_internal();
    }

    // ------------------------------------------------------------------
    // Collector interface
    // ------------------------------------------------------------------

    /// Take everything buffered so far.
    pub fn drain(&self) -> Drained {
        self.buffer.drain()
    }

    /// Wake the collector if records are waiting.
    pub fn notify_if_non_empty(&self) -> bool {
        self.buffer.notify_if_non_empty()
    }

    /// Wake-up channel fed by the buffer
    #[must_use]
    pub fn signals(&self) -> Receiver<BufferSignal> {
        self.buffer.signals()
    }

    #[must_use]
    pub fn thread_names(&self) -> Vec<(ThreadNo, Option<String>)> {
        self.registry.thread_names()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.barrier.is_suspended()
    }

    #[must_use]
    pub fn stack_depth_limit(&self) -> u32 {
        self.stack_depth_limit.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn remaining_thread_slots(&self) -> u32 {
        self.admission.remaining()
    }

    #[must_use]
    pub fn registered_threads(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_method_invoked(&self, method: MethodId) -> bool {
        self.activation.is_invoked(method)
    }

    #[must_use]
    pub fn invoked_methods(&self) -> usize {
        self.activation.invoked_count()
    }

    #[must_use]
    pub fn buffered_events(&self) -> usize {
        self.buffer.len()
    }

    /// State of the calling thread, `None` if it is not registered
    #[must_use]
    pub fn current_thread_snapshot(&self) -> Option<ThreadSnapshot> {
        match self.registry.current() {
            Membership::Registered(slot) => Some(slot.snapshot()),
            Membership::Unregistered | Membership::Denied => None,
        }
    }

    // ------------------------------------------------------------------
    // Hook-side helpers
    // ------------------------------------------------------------------

    /// Nanoseconds since this tracer was created
    pub(super) fn now(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Whether a frame at `depth` gets entry/exit records
    pub(super) fn within_depth_limit(&self, depth: u32) -> bool {
        depth <= self.stack_depth_limit.load(Ordering::Relaxed)
    }

    /// Encode and append one record for `thread` from a hook that started in
    /// `epoch`; a refused record only bumps a counter.
    pub(super) fn emit(
        &self,
        epoch: u64,
        thread: &ThreadState,
        kind: EventKind,
        method: MethodId,
        ret: Option<ReturnValue>,
    ) {
        let ret = ret.filter(|_| self.capture_return_values);
        let record = encode(kind, method.0, thread.thread_no().0, self.now(), ret);
        match self.buffer.append_from(record, epoch) {
            Ok(()) => self.stats.record_written(),
            Err(err) => self.stats.record_failure(HookError::Buffer(err)),
        }
    }

    /// Thread-creation record for a freshly admitted thread
    pub(super) fn emit_thread_created(&self, epoch: u64, thread: &ThreadState) {
        self.stats.record_registration();
        let record = encode(
            EventKind::ThreadCreated,
            NO_METHOD,
            thread.thread_no().0,
            self.now(),
            None,
        );
        match self.buffer.append_control(record, epoch) {
            Ok(()) => self.stats.record_written(),
            Err(err) => self.stats.record_failure(HookError::Buffer(err)),
        }
    }

    /// Mark `method` as invoked and, the first time, ask for its callees to be instrumented.
    pub(super) fn note_invocation(&self, method: MethodId) {
        if !self.activation.mark_invoked_if_first(method) || !self.expand_on_first_invoke {
            return;
        }
        let Some(handler) = &self.first_invoke else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| handler.on_first_invoke(method))).is_err() {
            warn!("first-invoke handler panicked for {method}");
        }
    }

    fn marker(&self, kind: EventKind) -> calltrace_common::TraceRecord {
        encode(kind, NO_METHOD, NO_THREAD, self.now(), None)
    }
}
