//! # Event Collection
//!
//! Drains the tracer's buffer from a dedicated thread and routes decoded
//! events to their consumers.
//!
//! ## Wake-ups
//!
//! The buffer signals `NonEmpty` (root/marker entries, resume) and `Full`.
//! Signals may be coalesced or lost when the channel is full, so the loop also
//! drains on a poll timeout.
//!
//! ## Outputs
//!
//! - **Export**: add to the Chrome trace exporter
//! - **Channel**: forward each event to a live consumer

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use calltrace_common::{EventKind, TraceRecord};

use crate::domain::Event;
use crate::export::ChromeTraceExporter;
use crate::runtime::{BufferSignal, Tracer};

/// Running totals kept by the collector
#[derive(Debug, Default, Clone)]
pub struct CollectionStats {
    /// Non-empty drains
    pub batches: u64,
    pub records: u64,
    /// Events the buffer reported as lost to overflow
    pub dropped: u64,
    pub decode_failures: u64,
    pub per_kind: HashMap<EventKind, u64>,
}

impl CollectionStats {
    #[must_use]
    pub fn count(&self, kind: EventKind) -> u64 {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Encapsulates draining and routing state
pub struct Collector {
    tracer: Arc<Tracer>,
    signals: Receiver<BufferSignal>,

    pub stats: CollectionStats,

    // Optional outputs
    trace_exporter: Option<ChromeTraceExporter>,
    event_tx: Option<Sender<Event>>,
}

impl Collector {
    #[must_use]
    pub fn new(
        tracer: Arc<Tracer>,
        trace_exporter: Option<ChromeTraceExporter>,
        event_tx: Option<Sender<Event>>,
    ) -> Self {
        let signals = tracer.signals();
        Self {
            tracer,
            signals,
            stats: CollectionStats::default(),
            trace_exporter,
            event_tx,
        }
    }

    /// Drain the buffer once and process everything in it.
    ///
    /// Returns the number of records drained.
    pub fn collect_once(&mut self) -> usize {
        let drained = self.tracer.drain();
        if drained.dropped > 0 {
            warn!(
                "event buffer overflowed: {} events dropped since last drain",
                drained.dropped
            );
            self.stats.dropped += drained.dropped;
        }
        if drained.records.is_empty() {
            return 0;
        }

        self.stats.batches += 1;
        let count = drained.records.len();
        for record in &drained.records {
            self.process_record(record);
        }
        count
    }

    /// Collect until `stop` is set, then drain one last time.
    ///
    /// The calling thread is excluded from tracing for the tracer's lifetime.
    pub fn run(&mut self, stop: &AtomicBool, poll: Duration) {
        self.tracer.mark_current_thread_internal();
        debug!("collector started (poll every {poll:?})");

        while !stop.load(Ordering::Acquire) {
            match self.signals.recv_timeout(poll) {
                Ok(_) | Err(RecvTimeoutError::Timeout) => {
                    self.collect_once();
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.collect_once();
        debug!(
            "collector stopped: {} records in {} batches",
            self.stats.records, self.stats.batches
        );
    }

    /// Copy the tracer's thread names into the exporter.
    pub fn sync_thread_names(&mut self) {
        if let Some(exporter) = self.trace_exporter.as_mut() {
            for (thread, name) in self.tracer.thread_names() {
                if let Some(name) = name {
                    exporter.set_thread_name(thread, name);
                }
            }
        }
    }

    /// Take the trace exporter (for final export)
    pub fn take_exporter(&mut self) -> Option<ChromeTraceExporter> {
        self.trace_exporter.take()
    }

    fn process_record(&mut self, record: &TraceRecord) {
        self.stats.records += 1;
        let event = match Event::decode(record) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!("skipping undecodable record: {e}");
                return;
            }
        };
        *self.stats.per_kind.entry(event.kind).or_insert(0) += 1;

        if let Some(exporter) = self.trace_exporter.as_mut() {
            exporter.add_event(&event);
        }
        if let Some(tx) = &self.event_tx {
            // Consumer gone: stop forwarding
            if tx.send(event).is_err() {
                self.event_tx = None;
            }
        }
    }
}
