//! Decoded event, the collector-side view of a [`TraceRecord`]

use calltrace_common::{DecodeError, EventKind, ReturnValue, TraceRecord};

use super::types::{MethodId, ThreadNo, Timestamp};

/// One immutable trace event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub method: MethodId,
    pub thread: ThreadNo,
    pub timestamp: Timestamp,
    /// Return value, only ever present on exit kinds
    pub ret: Option<ReturnValue>,
}

impl Event {
    /// Decode a buffered record
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the kind byte or payload tag is unknown.
    pub fn decode(record: &TraceRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            kind: record.event_kind()?,
            method: MethodId(record.method_id),
            thread: ThreadNo(record.thread_no),
            timestamp: Timestamp(record.timestamp_ns),
            ret: record.return_value()?,
        })
    }

    /// Encode back into the compact form
    #[must_use]
    pub fn encode(&self) -> TraceRecord {
        calltrace_common::encode(self.kind, self.method.0, self.thread.0, self.timestamp.0, self.ret)
    }
}
