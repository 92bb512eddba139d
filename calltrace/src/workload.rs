//! Synthetic instrumented workload
//!
//! Stands in for rewritten application code: every "method" below calls the
//! hooks exactly where injected instrumentation would. Each worker thread runs
//! `iterations` batches of
//!
//! ```text
//!   batch (marker) ─► run (root) ─► level_1 ─► level_2 ─► ... ─► level_<depth>
//!                                   (fanout calls per level)
//! ```
//!
//! With `suspend_midway`, the coordinating thread suspends tracing after half
//! the iterations, lets every worker run one batch while suspended, then
//! resumes.

use anyhow::{Context, Result};
use log::debug;
use std::sync::{Barrier, Mutex, PoisonError};
use std::thread;

use calltrace_common::ReturnValue;

use crate::domain::MethodId;
use crate::runtime::{FirstInvokeHandler, Tracer};

pub const BATCH_METHOD: MethodId = MethodId(1);
pub const ROOT_METHOD: MethodId = MethodId(2);
const LEVEL_BASE: u16 = 16;
/// Deepest call tree the method id space allows
pub const MAX_DEPTH: u32 = (u16::MAX - LEVEL_BASE) as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workload {
    pub threads: usize,
    pub depth: u32,
    pub fanout: u32,
    pub iterations: u32,
    /// Wrap each root in a marker method
    pub use_marker: bool,
    pub suspend_midway: bool,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            threads: 4,
            depth: 4,
            fanout: 2,
            iterations: 10,
            use_marker: true,
            suspend_midway: false,
        }
    }
}

impl Workload {
    /// Names of every method id this workload uses
    #[must_use]
    pub fn method_names(&self) -> Vec<(MethodId, String)> {
        let mut names = vec![
            (BATCH_METHOD, "workload::batch".to_string()),
            (ROOT_METHOD, "workload::run".to_string()),
        ];
        names.extend((1..=self.depth.min(MAX_DEPTH)).map(|level| {
            (level_method(level), format!("workload::level_{level}"))
        }));
        names
    }

    /// Run the workload on `threads` named worker threads and wait for them.
    ///
    /// # Errors
    ///
    /// Fails if a worker thread cannot be spawned or the midway
    /// suspend/resume is refused.
    pub fn run(&self, tracer: &Tracer) -> Result<()> {
        let rendezvous = Barrier::new(self.threads + 1);
        let first_half = self.iterations / 2;

        thread::scope(|s| -> Result<()> {
            let mut handles = Vec::with_capacity(self.threads);
            for i in 0..self.threads {
                let rendezvous = &rendezvous;
                let handle = thread::Builder::new()
                    .name(format!("worker-{i}"))
                    .spawn_scoped(s, move || {
                        if self.suspend_midway {
                            self.batches(tracer, first_half);
                            // suspended phase
                            rendezvous.wait();
                            rendezvous.wait();
                            self.batches(tracer, 1);
                            rendezvous.wait();
                            rendezvous.wait();
                            self.batches(tracer, self.iterations - first_half);
                        } else {
                            self.batches(tracer, self.iterations);
                        }
                    })
                    .with_context(|| format!("Failed to spawn worker-{i}"))?;
                handles.push(handle);
            }

            if self.suspend_midway {
                rendezvous.wait();
                let suspended = tracer.suspend_all();
                rendezvous.wait();
                rendezvous.wait();
                let resumed = tracer.resume_all();
                rendezvous.wait();
                suspended.context("Failed to suspend tracing")?;
                resumed.context("Failed to resume tracing")?;
            }
            debug!("{} workload threads running", handles.len());
            Ok(())
        })
    }

    fn batches(&self, tracer: &Tracer, count: u32) {
        for _ in 0..count {
            if self.use_marker {
                tracer.marker_entry(BATCH_METHOD);
            }
            tracer.root_entry(ROOT_METHOD);
            let mut total = 0;
            for _ in 0..self.fanout {
                total += visit(tracer, 1, self.depth.min(MAX_DEPTH), self.fanout);
            }
            tracer.root_exit_with_value(ROOT_METHOD, ReturnValue::Int(total));
            if self.use_marker {
                tracer.marker_exit(BATCH_METHOD);
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn level_method(level: u32) -> MethodId {
    MethodId(LEVEL_BASE + level.min(MAX_DEPTH) as u16)
}

fn visit(tracer: &Tracer, level: u32, depth: u32, fanout: u32) -> i64 {
    if level > depth {
        return 0;
    }
    let method = level_method(level);
    tracer.method_entry(method);
    let mut sum = i64::from(level);
    if level < depth {
        for _ in 0..fanout {
            sum += visit(tracer, level + 1, depth, fanout);
        }
    }
    tracer.method_exit_with_value(method, ReturnValue::Int(sum));
    sum
}

/// First-invoke handler that records which methods would have had their
/// callees instrumented.
#[derive(Debug, Default)]
pub struct ExpansionLog {
    expanded: Mutex<Vec<MethodId>>,
}

impl ExpansionLog {
    #[must_use]
    pub fn expanded(&self) -> Vec<MethodId> {
        self.expanded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FirstInvokeHandler for ExpansionLog {
    fn on_first_invoke(&self, method: MethodId) {
        debug!("instrumenting callees of {method}");
        self.expanded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracerConfig;
    use std::sync::Arc;

    #[test]
    fn test_method_names_cover_all_levels() {
        let workload = Workload { depth: 3, ..Workload::default() };
        let names = workload.method_names();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&(MethodId(LEVEL_BASE + 3), "workload::level_3".to_string())));
    }

    #[test]
    fn test_single_thread_event_counts() {
        let tracer = Tracer::new(&TracerConfig::default()).unwrap();
        let workload = Workload {
            threads: 1,
            depth: 2,
            fanout: 2,
            iterations: 1,
            use_marker: false,
            suspend_midway: false,
        };
        workload.run(&tracer).unwrap();

        // thread created + root pair + (2 level_1 + 4 level_2) pairs
        assert_eq!(tracer.drain().records.len(), 1 + 2 + 2 * 6);
    }

    #[test]
    fn test_expansion_fires_once_per_method() {
        let log = Arc::new(ExpansionLog::default());
        let tracer = Tracer::new(&TracerConfig::default())
            .unwrap()
            .with_first_invoke_handler(Arc::clone(&log) as Arc<dyn FirstInvokeHandler>);
        let workload = Workload { threads: 3, depth: 3, iterations: 4, ..Workload::default() };
        workload.run(&tracer).unwrap();

        let mut expanded = log.expanded();
        expanded.sort();
        // the marker is only ever entered outside a root
        assert_eq!(
            expanded,
            vec![ROOT_METHOD, level_method(1), level_method(2), level_method(3)]
        );
    }
}
