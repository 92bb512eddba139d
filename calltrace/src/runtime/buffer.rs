//! # Event Buffer
//!
//! Bounded, mutex-protected buffer of [`TraceRecord`]s shared by every traced
//! thread and drained wholesale by the collector.
//!
//! ## Signalling
//!
//! The buffer never blocks a hook to wake the collector: signals go through a
//! small bounded channel with `try_send`, and a full channel simply means a
//! wake-up is already pending.
//!
//! - `BufferSignal::NonEmpty` → `notify_if_non_empty()` found records
//! - `BufferSignal::Full` → an append filled or overflowed the buffer
//!
//! ## Sealing
//!
//! Suspension seals the buffer in the same critical section that writes the
//! `THREADS_SUSPENDED` record. A seal carries the suspend epoch: records from
//! hooks that started under an older epoch were already in flight and are
//! still accepted, anything newer is refused. Bookkeeping records bypass the
//! capacity check but not the seal.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use calltrace_common::TraceRecord;

use crate::domain::BufferError;

/// Pending wake-ups kept in the channel; more would only repeat the same news.
const SIGNAL_DEPTH: usize = 4;

/// Upper bound for up-front allocation, so huge capacities grow lazily.
const MAX_PREALLOC: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSignal {
    NonEmpty,
    Full,
}

/// Result of a drain: everything buffered plus what was lost since the last drain.
#[derive(Debug, Default)]
pub struct Drained {
    pub records: Vec<TraceRecord>,
    /// Records refused for capacity since the previous drain
    pub dropped: u64,
}

struct Inner {
    records: Vec<TraceRecord>,
    capacity: usize,
    /// Epoch of the suspension that sealed the buffer
    sealed_at: Option<u64>,
}

impl Inner {
    fn refuses(&self, epoch: u64) -> bool {
        self.sealed_at.is_some_and(|sealed| epoch >= sealed)
    }
}

pub struct EventBuffer {
    inner: Mutex<Inner>,
    dropped_since_drain: AtomicU64,
    signal_tx: Sender<BufferSignal>,
    signal_rx: Receiver<BufferSignal>,
}

impl EventBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (signal_tx, signal_rx) = bounded(SIGNAL_DEPTH);
        Self {
            inner: Mutex::new(Inner {
                records: Vec::with_capacity(capacity.min(MAX_PREALLOC)),
                capacity,
                sealed_at: None,
            }),
            dropped_since_drain: AtomicU64::new(0),
            signal_tx,
            signal_rx,
        }
    }

    /// Append an application record; refused outright while sealed.
    ///
    /// # Errors
    ///
    /// See [`append_from`](Self::append_from).
    pub fn append(&self, record: TraceRecord) -> Result<(), BufferError> {
        self.append_from(record, u64::MAX)
    }

    /// Append an application record written by a hook that started in `epoch`.
    ///
    /// # Errors
    ///
    /// [`BufferError::Sealed`] if a suspension at or after `epoch` sealed the
    /// buffer, [`BufferError::Overflow`] when the buffer is at capacity. Either
    /// way the record is dropped.
    pub fn append_from(&self, record: TraceRecord, epoch: u64) -> Result<(), BufferError> {
        let mut inner = self.lock();
        if inner.refuses(epoch) {
            return Err(BufferError::Sealed);
        }

        let capacity = inner.capacity;
        if inner.records.len() >= capacity {
            self.dropped_since_drain.fetch_add(1, Ordering::Relaxed);
            drop(inner);
            self.signal(BufferSignal::Full);
            return Err(BufferError::Overflow { capacity });
        }

        inner.records.push(record);
        let now_full = inner.records.len() == capacity;
        drop(inner);

        if now_full {
            self.signal(BufferSignal::Full);
        }
        Ok(())
    }

    /// Append a bookkeeping record written by the profiler itself; capacity is not enforced.
    ///
    /// # Errors
    ///
    /// [`BufferError::Sealed`] under the same rule as [`append_from`](Self::append_from).
    pub fn append_control(&self, record: TraceRecord, epoch: u64) -> Result<(), BufferError> {
        let mut inner = self.lock();
        if inner.refuses(epoch) {
            return Err(BufferError::Sealed);
        }
        inner.records.push(record);
        Ok(())
    }

    /// Seal for suspend `epoch` and write `marker` atomically. Returns `false` if already sealed.
    pub fn seal_with(&self, marker: TraceRecord, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.sealed_at.is_some() {
            return false;
        }
        inner.sealed_at = Some(epoch);
        inner.records.push(marker);
        true
    }

    /// Write `marker` and unseal atomically. Returns `false` if not sealed.
    pub fn unseal_with(&self, marker: TraceRecord) -> bool {
        let mut inner = self.lock();
        if inner.sealed_at.is_none() {
            return false;
        }
        inner.records.push(marker);
        inner.sealed_at = None;
        drop(inner);
        self.signal(BufferSignal::NonEmpty);
        true
    }

    /// Take every buffered record, leaving the buffer empty.
    pub fn drain(&self) -> Drained {
        let mut inner = self.lock();
        let fresh = Vec::with_capacity(inner.capacity.min(MAX_PREALLOC));
        let records = std::mem::replace(&mut inner.records, fresh);
        // Overflow counts under the same lock, so a drop lands in exactly one batch
        let dropped = self.dropped_since_drain.swap(0, Ordering::Relaxed);
        Drained { records, dropped }
    }

    /// Wake the collector if there is anything to drain.
    pub fn notify_if_non_empty(&self) -> bool {
        if self.is_empty() {
            return false;
        }
        self.signal(BufferSignal::NonEmpty);
        true
    }

    /// Discard all records and set a new capacity. The seal state is kept.
    pub fn reset(&self, capacity: usize) {
        let mut inner = self.lock();
        inner.records = Vec::with_capacity(capacity.min(MAX_PREALLOC));
        inner.capacity = capacity;
        self.dropped_since_drain.store(0, Ordering::Relaxed);
    }

    /// Receiving end of the wake-up channel
    #[must_use]
    pub fn signals(&self) -> Receiver<BufferSignal> {
        self.signal_rx.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed_at.is_some()
    }

    // A panic while holding the lock leaves the Vec intact; keep using it.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(&self, signal: BufferSignal) {
        let _ = self.signal_tx.try_send(signal);
    }
}
