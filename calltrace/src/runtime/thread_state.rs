//! Per-thread call-stack state
//!
//! One [`ThreadState`] per admitted thread. Every field is written only by the
//! owning thread, except the guard counter, which `suspend_all`/`resume_all`
//! bump from outside. Fields are atomics so the slot can be shared through an
//! `Arc` with the registry; the owner-only fields use relaxed ordering.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use crate::domain::ThreadNo;

/// Coarse lifecycle phase of a registered thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPhase {
    /// Registered, not inside a traced subtree
    Idle,
    /// Inside a traced subtree at the given logical depth
    InCallGraph { depth: u32 },
}

/// Point-in-time copy of a [`ThreadState`], for tests and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub thread_no: ThreadNo,
    pub in_call_graph: bool,
    pub stack_depth: u32,
    pub root_stack_depth: u32,
    pub guard: i32,
}

impl ThreadSnapshot {
    #[must_use]
    pub fn phase(&self) -> ThreadPhase {
        if self.in_call_graph {
            ThreadPhase::InCallGraph { depth: self.stack_depth }
        } else {
            ThreadPhase::Idle
        }
    }
}

#[derive(Debug)]
pub struct ThreadState {
    thread_no: ThreadNo,
    name: Option<String>,
    in_call_graph: AtomicBool,
    stack_depth: AtomicU32,
    root_stack_depth: AtomicU32,
    /// > 0 while profiler code runs on (or on behalf of) this thread
    guard: AtomicI32,
}

impl ThreadState {
    #[must_use]
    pub fn new(thread_no: ThreadNo, name: Option<String>) -> Self {
        Self {
            thread_no,
            name,
            in_call_graph: AtomicBool::new(false),
            stack_depth: AtomicU32::new(0),
            root_stack_depth: AtomicU32::new(0),
            guard: AtomicI32::new(0),
        }
    }

    #[must_use]
    pub fn thread_no(&self) -> ThreadNo {
        self.thread_no
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn in_call_graph(&self) -> bool {
        self.in_call_graph.load(Ordering::Relaxed)
    }

    pub fn set_in_call_graph(&self, value: bool) {
        self.in_call_graph.store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn stack_depth(&self) -> u32 {
        self.stack_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn root_stack_depth(&self) -> u32 {
        self.root_stack_depth.load(Ordering::Relaxed)
    }

    pub fn set_root_stack_depth(&self, depth: u32) {
        self.root_stack_depth.store(depth, Ordering::Relaxed);
    }

    /// Inside a traced subtree that has an active root
    #[must_use]
    pub fn under_root(&self) -> bool {
        self.in_call_graph() && self.root_stack_depth() > 0
    }

    /// Open a frame; returns its depth (1 for the outermost frame).
    pub fn push_frame(&self) -> u32 {
        let depth = self.stack_depth().saturating_add(1);
        self.stack_depth.store(depth, Ordering::Relaxed);
        depth
    }

    /// Close the innermost frame; returns the depth left behind.
    pub fn pop_frame(&self) -> u32 {
        let depth = self.stack_depth().saturating_sub(1);
        self.stack_depth.store(depth, Ordering::Relaxed);
        depth
    }

    /// Back to idle: out of the call graph, no root.
    pub fn leave_call_graph(&self) {
        self.set_in_call_graph(false);
        self.set_root_stack_depth(0);
    }

    /// Enter profiler code on this thread, unless it is already inside it.
    ///
    /// The returned guard keeps hooks on this thread inert until dropped.
    #[must_use]
    pub fn enter_guard(&self) -> Option<ReentrancyGuard<'_>> {
        let previous = self.guard.fetch_add(1, Ordering::AcqRel);
        if previous > 0 {
            self.guard.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(ReentrancyGuard { state: self })
    }

    #[must_use]
    pub fn is_guarded(&self) -> bool {
        self.guard.load(Ordering::Acquire) > 0
    }

    /// Advisory bump applied from another thread while tracing is suspended.
    pub(crate) fn bump_guard(&self) {
        self.guard.fetch_add(1, Ordering::AcqRel);
    }

    /// Undo one [`bump_guard`](Self::bump_guard); never goes below zero.
    pub(crate) fn release_guard(&self) {
        let _ = self.guard.fetch_update(Ordering::AcqRel, Ordering::Acquire, |g| {
            (g > 0).then(|| g - 1)
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            thread_no: self.thread_no,
            in_call_graph: self.in_call_graph(),
            stack_depth: self.stack_depth(),
            root_stack_depth: self.root_stack_depth(),
            guard: self.guard.load(Ordering::Acquire),
        }
    }
}

/// RAII marker for "this thread is running profiler code"
///
/// Dropping it on any exit path, early returns included, releases the guard.
#[must_use = "the guard is released as soon as it is dropped"]
pub struct ReentrancyGuard<'a> {
    state: &'a ThreadState,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.state.guard.fetch_sub(1, Ordering::AcqRel);
    }
}
