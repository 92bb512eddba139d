use calltrace::domain::{HookError, MethodId};
use calltrace::runtime::{FirstInvokeHandler, ThreadPhase};
use calltrace::{ResetParams, Tracer, TracerConfig};
use calltrace_common::{EventKind, TraceRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

const ROOT: MethodId = MethodId(1);
const CALLEE: MethodId = MethodId(2);
const LEAF: MethodId = MethodId(3);
const MARKER: MethodId = MethodId(10);

fn tracer() -> Tracer {
    Tracer::new(&TracerConfig::default()).expect("default config is valid")
}

fn kinds(records: &[TraceRecord]) -> Vec<EventKind> {
    records
        .iter()
        .map(|r| r.event_kind().expect("valid kind"))
        .collect()
}

/// Kinds of everything buffered after the thread-creation record
fn traced_kinds(tracer: &Tracer) -> Vec<EventKind> {
    let records = tracer.drain().records;
    kinds(&records)
        .into_iter()
        .filter(|k| *k != EventKind::ThreadCreated)
        .collect()
}

#[test]
fn test_well_nested_calls_restore_depth() {
    let tracer = tracer();
    tracer.root_entry(ROOT);
    tracer.method_entry(CALLEE);
    tracer.method_entry(LEAF);
    assert_eq!(tracer.current_thread_snapshot().unwrap().stack_depth, 3);
    tracer.method_exit(LEAF);
    tracer.method_exit(CALLEE);
    tracer.root_exit(ROOT);

    let snap = tracer.current_thread_snapshot().unwrap();
    assert_eq!(snap.stack_depth, 0);
    assert_eq!(snap.phase(), ThreadPhase::Idle);
}

#[test]
fn test_each_root_entry_has_one_root_exit() {
    let tracer = tracer();
    for _ in 0..3 {
        tracer.root_entry(ROOT);
        tracer.method_entry(CALLEE);
        tracer.method_exit(CALLEE);
        tracer.root_exit(ROOT);
    }

    let kinds = traced_kinds(&tracer);
    let entries = kinds.iter().filter(|k| **k == EventKind::RootEntry).count();
    let exits = kinds.iter().filter(|k| **k == EventKind::RootExit).count();
    assert_eq!(entries, 3);
    assert_eq!(exits, 3);
}

#[test]
fn test_depth_limit_hides_deep_frames() {
    let config = TracerConfig { stack_depth_limit: 2, ..TracerConfig::default() };
    let tracer = Tracer::new(&config).unwrap();

    tracer.root_entry(ROOT);
    tracer.method_entry(CALLEE);
    tracer.method_entry(LEAF);
    tracer.method_exit(LEAF);
    tracer.method_exit(CALLEE);
    tracer.root_exit(ROOT);

    let records = tracer.drain().records;
    let traced: Vec<(EventKind, u16)> = records
        .iter()
        .filter(|r| r.event_kind().unwrap() != EventKind::ThreadCreated)
        .map(|r| (r.event_kind().unwrap(), r.method_id))
        .collect();
    assert_eq!(
        traced,
        vec![
            (EventKind::RootEntry, ROOT.0),
            (EventKind::MethodEntry, CALLEE.0),
            (EventKind::MethodExit, CALLEE.0),
            (EventKind::RootExit, ROOT.0),
        ]
    );
    assert_eq!(tracer.current_thread_snapshot().unwrap().stack_depth, 0);
}

#[test]
fn test_no_thread_slots_means_no_trace() {
    let config = TracerConfig { profiled_threads_allowed: 0, ..TracerConfig::default() };
    let tracer = Tracer::new(&config).unwrap();

    tracer.root_entry(ROOT);
    tracer.method_entry(CALLEE);
    tracer.method_exit(CALLEE);
    tracer.root_exit(ROOT);
    tracer.marker_entry(MARKER);
    tracer.marker_exit(MARKER);

    assert_eq!(tracer.buffered_events(), 0);
    assert_eq!(tracer.registered_threads(), 0);
    assert!(tracer.current_thread_snapshot().is_none());
    assert_eq!(tracer.stats().threads_registered, 0);
}

#[test]
fn test_suspended_hooks_leave_only_markers() {
    let tracer = tracer();
    tracer.root_entry(ROOT);
    tracer.drain();

    tracer.suspend_all().unwrap();
    assert_eq!(tracer.try_method_entry(CALLEE), Err(HookError::Suspended));
    tracer.method_entry(LEAF);
    tracer.resume_all().unwrap();

    assert_eq!(
        kinds(&tracer.drain().records),
        vec![EventKind::ThreadsSuspended, EventKind::ThreadsResumed]
    );
    let snap = tracer.current_thread_snapshot().unwrap();
    assert_eq!(snap.stack_depth, 1);
    assert_eq!(snap.guard, 0);
    // only the infallible hook counts; try_* reports to the caller instead
    assert_eq!(tracer.stats().suspended_calls, 1);
}

#[test]
fn test_resume_without_suspend_keeps_state() {
    let tracer = tracer();
    tracer.root_entry(ROOT);
    let before = tracer.current_thread_snapshot().unwrap();

    assert!(tracer.resume_all().is_err());

    assert_eq!(tracer.current_thread_snapshot().unwrap(), before);
    tracer.method_entry(CALLEE);
    assert_eq!(tracer.current_thread_snapshot().unwrap().stack_depth, 2);
}

#[test]
fn test_root_under_marker_is_a_real_root() {
    let tracer = tracer();
    tracer.marker_entry(MARKER);
    tracer.root_entry(ROOT);
    let inside = tracer.current_thread_snapshot().unwrap();
    assert_eq!(inside.stack_depth, 2);
    assert_eq!(inside.root_stack_depth, 2);

    tracer.method_entry(CALLEE);
    tracer.method_exit(CALLEE);
    tracer.root_exit(ROOT);
    let after_root = tracer.current_thread_snapshot().unwrap();
    assert_eq!(after_root.root_stack_depth, 0);
    assert!(after_root.in_call_graph);

    tracer.marker_exit(MARKER);

    assert_eq!(
        traced_kinds(&tracer),
        vec![
            EventKind::MarkerEntry,
            EventKind::RootEntry,
            EventKind::MethodEntry,
            EventKind::MethodExit,
            EventKind::RootExit,
            EventKind::MarkerExit,
        ]
    );
    assert_eq!(tracer.current_thread_snapshot().unwrap().phase(), ThreadPhase::Idle);
}

#[test]
fn test_methods_under_marker_without_root_are_ignored() {
    let tracer = tracer();
    tracer.marker_entry(MARKER);
    tracer.method_entry(CALLEE);
    tracer.method_exit(CALLEE);
    tracer.marker_exit(MARKER);

    assert_eq!(traced_kinds(&tracer), vec![EventKind::MarkerEntry, EventKind::MarkerExit]);
    assert!(!tracer.is_method_invoked(CALLEE));
    assert!(!tracer.is_method_invoked(MARKER));
}

#[test]
fn test_marker_under_root_expands_once() {
    let tracer = tracer();
    tracer.root_entry(ROOT);
    tracer.marker_entry(MARKER);
    tracer.marker_exit(MARKER);
    tracer.root_exit(ROOT);

    assert!(tracer.is_method_invoked(MARKER));
    assert_eq!(
        traced_kinds(&tracer),
        vec![
            EventKind::RootEntry,
            EventKind::MarkerEntry,
            EventKind::MarkerExit,
            EventKind::RootExit,
        ]
    );
}

#[test]
fn test_nested_marker_exit_keeps_call_graph() {
    let tracer = tracer();
    tracer.marker_entry(MARKER);
    tracer.marker_entry(MethodId(11));
    tracer.marker_exit(MethodId(11));
    assert!(tracer.current_thread_snapshot().unwrap().in_call_graph);
    tracer.marker_exit(MARKER);
    assert!(!tracer.current_thread_snapshot().unwrap().in_call_graph);
}

/// Calls back into the tracer from the first-invoke callback, as an
/// instrumentation agent running traced code would.
#[derive(Default)]
struct ReentrantHandler {
    tracer: OnceLock<Weak<Tracer>>,
    calls: AtomicUsize,
}

impl FirstInvokeHandler for ReentrantHandler {
    fn on_first_invoke(&self, _method: MethodId) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(tracer) = self.tracer.get().and_then(Weak::upgrade) {
            tracer.method_entry(MethodId(99));
            tracer.root_entry(MethodId(98));
        }
    }
}

#[test]
fn test_hooks_from_first_invoke_handler_are_suppressed() {
    let handler = Arc::new(ReentrantHandler::default());
    let tracer = Arc::new(
        Tracer::new(&TracerConfig::default())
            .unwrap()
            .with_first_invoke_handler(Arc::clone(&handler) as Arc<dyn FirstInvokeHandler>),
    );
    handler.tracer.set(Arc::downgrade(&tracer)).unwrap();

    tracer.root_entry(ROOT);
    tracer.method_entry(CALLEE);
    tracer.method_exit(CALLEE);
    tracer.root_exit(ROOT);

    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        traced_kinds(&tracer),
        vec![
            EventKind::RootEntry,
            EventKind::MethodEntry,
            EventKind::MethodExit,
            EventKind::RootExit,
        ]
    );
    // root_entry refused during the root's callback; both calls refused during the callee's
    assert_eq!(tracer.stats().guarded_calls, 3);
    assert!(!tracer.is_method_invoked(MethodId(99)));
    assert!(!tracer.is_method_invoked(MethodId(98)));
    assert_eq!(tracer.current_thread_snapshot().unwrap().stack_depth, 0);
}

struct PanickingHandler;

impl FirstInvokeHandler for PanickingHandler {
    fn on_first_invoke(&self, method: MethodId) {
        panic!("instrumentation failed for {method}");
    }
}

#[test]
fn test_panicking_handler_does_not_break_hooks() {
    let tracer = Tracer::new(&TracerConfig::default())
        .unwrap()
        .with_first_invoke_handler(Arc::new(PanickingHandler));

    tracer.root_entry(ROOT);
    tracer.root_exit(ROOT);

    assert_eq!(traced_kinds(&tracer), vec![EventKind::RootEntry, EventKind::RootExit]);
    assert_eq!(tracer.current_thread_snapshot().unwrap().guard, 0);
}

#[test]
fn test_expansion_can_be_disabled() {
    let handler = Arc::new(ReentrantHandler::default());
    let config = TracerConfig { expand_on_first_invoke: false, ..TracerConfig::default() };
    let tracer = Tracer::new(&config)
        .unwrap()
        .with_first_invoke_handler(Arc::clone(&handler) as Arc<dyn FirstInvokeHandler>);

    tracer.root_entry(ROOT);
    tracer.root_exit(ROOT);

    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert!(tracer.is_method_invoked(ROOT));
}

#[test]
fn test_reset_forgets_threads_and_activations() {
    let tracer = tracer();
    tracer.root_entry(ROOT);
    tracer.root_exit(ROOT);
    assert!(tracer.is_method_invoked(ROOT));

    tracer.suspend_all().unwrap();
    tracer
        .reset_all(ResetParams { thread_slots: 2, buffer_capacity: 16, stack_depth_limit: 1 })
        .unwrap();
    tracer.resume_all().unwrap();

    assert!(!tracer.is_method_invoked(ROOT));
    assert_eq!(tracer.registered_threads(), 0);
    assert!(tracer.current_thread_snapshot().is_none());
    assert_eq!(kinds(&tracer.drain().records), vec![EventKind::ThreadsResumed]);

    tracer.root_entry(ROOT);
    tracer.method_entry(CALLEE);
    tracer.method_exit(CALLEE);
    tracer.root_exit(ROOT);
    assert_eq!(
        kinds(&tracer.drain().records),
        vec![EventKind::ThreadCreated, EventKind::RootEntry, EventKind::RootExit]
    );
    assert_eq!(tracer.remaining_thread_slots(), 1);
}

#[test]
fn test_overflow_is_counted_not_fatal() {
    let config = TracerConfig { buffer_capacity: 3, ..TracerConfig::default() };
    let tracer = Tracer::new(&config).unwrap();

    for _ in 0..4 {
        tracer.root_entry(ROOT);
        tracer.root_exit(ROOT);
    }

    let drained = tracer.drain();
    assert_eq!(
        kinds(&drained.records),
        vec![EventKind::ThreadCreated, EventKind::RootEntry, EventKind::RootExit]
    );
    assert_eq!(drained.dropped, 6);
    assert_eq!(tracer.stats().events_dropped, 6);
    assert_eq!(tracer.current_thread_snapshot().unwrap().stack_depth, 0);
}
