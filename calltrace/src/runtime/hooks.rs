//! Hook entry points
//!
//! Instrumented code calls these on every method entry and exit. The public
//! hooks return nothing: whatever a hook declines to do ends up in
//! [`TracerStats`](super::stats::TracerStats). The `try_*` variants expose the
//! refusal reason instead.
//!
//! ```text
//!   Unregistered ──root/marker entry──► Idle ──► InCallGraph(depth) ──exit to 0──► Idle
//!        │
//!        └── admission refused ──► Denied (until reset_all)
//! ```
//!
//! A frame's depth is the stack depth while it is open (outermost frame = 1).
//! Entry and exit records are written only for frames at or below the depth
//! limit; the bookkeeping itself always happens.
//!
//! A hook notes the suspend epoch it started in. If `suspend_all` lands while
//! the hook is still running, its records are kept, so frames pushed before a
//! suspension are still matched by their exits after it.

use std::sync::Arc;

use calltrace_common::{EventKind, ReturnValue};

use super::registry::Membership;
use super::thread_state::ThreadState;
use super::tracer::Tracer;
use crate::domain::{HookError, MethodId};

impl Tracer {
    // ------------------------------------------------------------------
    // Public hooks
    // ------------------------------------------------------------------

    /// Entry into a root method: the start of a traced subtree.
    pub fn root_entry(&self, method: MethodId) {
        self.settle(self.try_root_entry(method));
    }

    /// Exit from a root method.
    pub fn root_exit(&self, method: MethodId) {
        self.settle(self.try_method_exit(method, None));
    }

    pub fn root_exit_with_value(&self, method: MethodId, ret: ReturnValue) {
        self.settle(self.try_method_exit(method, Some(ret)));
    }

    /// Entry into an ordinary instrumented method.
    pub fn method_entry(&self, method: MethodId) {
        self.settle(self.try_method_entry(method));
    }

    pub fn method_exit(&self, method: MethodId) {
        self.settle(self.try_method_exit(method, None));
    }

    pub fn method_exit_with_value(&self, method: MethodId, ret: ReturnValue) {
        self.settle(self.try_method_exit(method, Some(ret)));
    }

    /// Entry into a marker method, which brackets a subtree without being a root.
    pub fn marker_entry(&self, method: MethodId) {
        self.settle(self.try_marker_entry(method));
    }

    pub fn marker_exit(&self, method: MethodId) {
        self.settle(self.try_marker_exit(method, None));
    }

    pub fn marker_exit_with_value(&self, method: MethodId, ret: ReturnValue) {
        self.settle(self.try_marker_exit(method, Some(ret)));
    }

    // ------------------------------------------------------------------
    // Fallible variants
    // ------------------------------------------------------------------

    /// Root entry, reporting why nothing happened.
    ///
    /// A root entered while another root is active degrades to a method entry.
    /// A root entered under a marker (no active root) is a real root whose
    /// depth is greater than one.
    ///
    /// # Errors
    ///
    /// [`HookError::Suspended`], [`HookError::AdmissionDenied`] or
    /// [`HookError::Guarded`] when the call had no effect.
    pub fn try_root_entry(&self, method: MethodId) -> Result<(), HookError> {
        let epoch = self.ensure_running()?;
        let (thread, fresh) = self.admit()?;
        let _guard = thread.enter_guard().ok_or(HookError::Guarded)?;
        if fresh {
            self.emit_thread_created(epoch, &thread);
        }
        self.buffer.notify_if_non_empty();

        if !thread.in_call_graph() && thread.stack_depth() > 0 {
            thread.set_in_call_graph(true);
            if thread.under_root() {
                self.enter_method_frame(epoch, &thread, method);
            }
            thread.set_in_call_graph(false);
            return Ok(());
        }
        if thread.under_root() {
            self.enter_method_frame(epoch, &thread, method);
            return Ok(());
        }

        if thread.stack_depth() == 0 {
            thread.set_in_call_graph(true);
        }
        self.note_invocation(method);
        let depth = thread.push_frame();
        thread.set_root_stack_depth(depth);
        if self.within_depth_limit(depth) {
            self.emit(epoch, &thread, EventKind::RootEntry, method, None);
        }
        Ok(())
    }

    /// Method entry; a no-op outside an active root.
    ///
    /// # Errors
    ///
    /// [`HookError::Suspended`] or [`HookError::Guarded`].
    pub fn try_method_entry(&self, method: MethodId) -> Result<(), HookError> {
        let epoch = self.ensure_running()?;
        let Some(thread) = self.registered() else {
            return Ok(());
        };
        if !thread.under_root() {
            return Ok(());
        }
        let _guard = thread.enter_guard().ok_or(HookError::Guarded)?;
        self.enter_method_frame(epoch, &thread, method);
        Ok(())
    }

    /// Method or root exit; a no-op outside an active root.
    ///
    /// # Errors
    ///
    /// [`HookError::Suspended`] or [`HookError::Guarded`].
    pub fn try_method_exit(
        &self,
        method: MethodId,
        ret: Option<ReturnValue>,
    ) -> Result<(), HookError> {
        let epoch = self.ensure_running()?;
        let Some(thread) = self.registered() else {
            return Ok(());
        };
        if !thread.under_root() {
            return Ok(());
        }
        let _guard = thread.enter_guard().ok_or(HookError::Guarded)?;

        let frame_depth = thread.stack_depth();
        if thread.root_stack_depth() == frame_depth {
            thread.set_root_stack_depth(0);
        }
        let kind = if thread.pop_frame() < 1 {
            thread.leave_call_graph();
            EventKind::RootExit
        } else if thread.root_stack_depth() == 0 {
            // root nested under a marker
            EventKind::RootExit
        } else {
            EventKind::MethodExit
        };
        if self.within_depth_limit(frame_depth) {
            self.emit(epoch, &thread, kind, method, ret);
        }
        Ok(())
    }

    /// Marker entry. Registers the thread like a root entry does.
    ///
    /// # Errors
    ///
    /// [`HookError::Suspended`], [`HookError::AdmissionDenied`] or
    /// [`HookError::Guarded`].
    pub fn try_marker_entry(&self, method: MethodId) -> Result<(), HookError> {
        let epoch = self.ensure_running()?;
        let (thread, fresh) = self.admit()?;
        let _guard = thread.enter_guard().ok_or(HookError::Guarded)?;
        if fresh {
            self.emit_thread_created(epoch, &thread);
        }
        self.buffer.notify_if_non_empty();

        thread.set_in_call_graph(true);
        if thread.root_stack_depth() > 0 {
            self.note_invocation(method);
        }
        let depth = thread.push_frame();
        if self.within_depth_limit(depth) {
            self.emit(epoch, &thread, EventKind::MarkerEntry, method, None);
        }
        Ok(())
    }

    /// Marker exit; a no-op outside the call graph.
    ///
    /// # Errors
    ///
    /// [`HookError::Suspended`] or [`HookError::Guarded`].
    pub fn try_marker_exit(
        &self,
        method: MethodId,
        ret: Option<ReturnValue>,
    ) -> Result<(), HookError> {
        let epoch = self.ensure_running()?;
        let Some(thread) = self.registered() else {
            return Ok(());
        };
        if !thread.in_call_graph() {
            return Ok(());
        }
        let _guard = thread.enter_guard().ok_or(HookError::Guarded)?;

        let frame_depth = thread.stack_depth();
        if thread.pop_frame() < 1 {
            thread.leave_call_graph();
        }
        if self.within_depth_limit(frame_depth) {
            self.emit(epoch, &thread, EventKind::MarkerExit, method, ret);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Caller holds the thread's guard and has checked it is under a root.
    fn enter_method_frame(&self, epoch: u64, thread: &ThreadState, method: MethodId) {
        self.note_invocation(method);
        let depth = thread.push_frame();
        if self.within_depth_limit(depth) {
            self.emit(epoch, thread, EventKind::MethodEntry, method, None);
        }
    }

    /// Suspend epoch the hook runs in
    fn ensure_running(&self) -> Result<u64, HookError> {
        self.barrier.running_epoch().ok_or(HookError::Suspended)
    }

    fn registered(&self) -> Option<Arc<ThreadState>> {
        match self.registry.current() {
            Membership::Registered(slot) => Some(slot),
            Membership::Unregistered | Membership::Denied => None,
        }
    }

    /// Slot of the calling thread, registering it if needed.
    /// The flag is true when the slot was created by this call.
    fn admit(&self) -> Result<(Arc<ThreadState>, bool), HookError> {
        match self.registry.current() {
            Membership::Registered(slot) => Ok((slot, false)),
            Membership::Denied => Err(HookError::AdmissionDenied),
            Membership::Unregistered => self
                .registry
                .register_current(&self.admission)
                .map(|slot| (slot, true))
                .ok_or(HookError::AdmissionDenied),
        }
    }

    fn settle(&self, result: Result<(), HookError>) {
        if let Err(err) = result {
            self.stats.record_failure(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use calltrace_common::{EventKind, ReturnValue, TraceRecord};

    use crate::config::TracerConfig;
    use crate::domain::{HookError, MethodId};
    use crate::runtime::Tracer;

    fn tracer_with(config: TracerConfig) -> Tracer {
        Tracer::new(&config).unwrap()
    }

    fn kinds(records: &[TraceRecord]) -> Vec<EventKind> {
        records.iter().filter_map(|r| r.event_kind().ok()).collect()
    }

    #[test]
    fn test_simple_root_subtree() {
        let tracer = tracer_with(TracerConfig::default());
        tracer.root_entry(MethodId(1));
        tracer.method_entry(MethodId(2));
        tracer.method_exit(MethodId(2));
        tracer.root_exit(MethodId(1));

        let records = tracer.drain().records;
        assert_eq!(
            kinds(&records),
            vec![
                EventKind::ThreadCreated,
                EventKind::RootEntry,
                EventKind::MethodEntry,
                EventKind::MethodExit,
                EventKind::RootExit,
            ]
        );
        let snap = tracer.current_thread_snapshot().unwrap();
        assert_eq!(snap.stack_depth, 0);
        assert!(!snap.in_call_graph);
        assert_eq!(snap.root_stack_depth, 0);
    }

    #[test]
    fn test_method_entry_outside_root_is_ignored() {
        let tracer = tracer_with(TracerConfig::default());
        assert_eq!(tracer.try_method_entry(MethodId(5)), Ok(()));
        tracer.method_exit(MethodId(5));
        assert!(tracer.drain().records.is_empty());
        assert!(tracer.current_thread_snapshot().is_none());
    }

    #[test]
    fn test_zero_slots_denies_admission() {
        let config = TracerConfig { profiled_threads_allowed: 0, ..TracerConfig::default() };
        let tracer = tracer_with(config);
        assert_eq!(tracer.try_root_entry(MethodId(1)), Err(HookError::AdmissionDenied));
        tracer.root_entry(MethodId(1));
        assert!(tracer.drain().records.is_empty());
        assert_eq!(tracer.registered_threads(), 0);
        assert_eq!(tracer.stats().admissions_denied, 1);
    }

    #[test]
    fn test_nested_root_degrades_to_method() {
        let tracer = tracer_with(TracerConfig::default());
        tracer.root_entry(MethodId(1));
        tracer.root_entry(MethodId(2));
        tracer.root_exit(MethodId(2));
        tracer.root_exit(MethodId(1));

        let records = tracer.drain().records;
        assert_eq!(
            kinds(&records)[1..],
            [EventKind::RootEntry, EventKind::MethodEntry, EventKind::MethodExit, EventKind::RootExit]
        );
    }

    #[test]
    fn test_return_value_dropped_unless_captured() {
        let tracer = tracer_with(TracerConfig::default());
        tracer.root_entry(MethodId(1));
        tracer.root_exit_with_value(MethodId(1), ReturnValue::Int(7));

        let records = tracer.drain().records;
        let exit = records.last().unwrap();
        assert_eq!(exit.return_value().unwrap(), None);
    }

    #[test]
    fn test_return_value_captured() {
        let config = TracerConfig { capture_return_values: true, ..TracerConfig::default() };
        let tracer = tracer_with(config);
        tracer.root_entry(MethodId(1));
        tracer.root_exit_with_value(MethodId(1), ReturnValue::Int(7));

        let records = tracer.drain().records;
        let exit = records.last().unwrap();
        assert_eq!(exit.return_value().unwrap(), Some(ReturnValue::Int(7)));
    }
}
