//! # Shared Record Definitions (hooks ↔ collector)
//!
//! Defines the compact record written by the tracing hooks into the event
//! buffer and read back by the collector. Records use `#[repr(C)]` and a fixed
//! little-endian byte form so they can be shipped as plain bytes by whatever
//! transport sits behind the collector.
//!
//! ## Key Types
//!
//! - [`TraceRecord`] - 24-byte encoded event
//! - [`EventKind`] - what happened (root/method/marker entry or exit, suspend markers)
//! - [`ReturnValue`] - optional payload of exit events
//! - [`encode`] - the pure encoder used on the hook path

#![no_std]

use thiserror::Error;

// ============================================================================
// Event Kind Constants
// ============================================================================

/// Entry into a root method (start of a traced call subtree)
pub const ROOT_ENTRY: u8 = 1;

/// Exit from a root method
///
/// Paired with: `ROOT_ENTRY`
pub const ROOT_EXIT: u8 = 2;

/// Entry into an instrumented method below a root
pub const METHOD_ENTRY: u8 = 3;

/// Exit from an instrumented method below a root
///
/// Paired with: `METHOD_ENTRY`
pub const METHOD_EXIT: u8 = 4;

/// Entry into a marker method
pub const MARKER_ENTRY: u8 = 5;

/// Exit from a marker method
///
/// Paired with: `MARKER_ENTRY`
pub const MARKER_EXIT: u8 = 6;

/// All tracing was suspended by the profiler (written by the suspending thread)
pub const THREADS_SUSPENDED: u8 = 7;

/// Tracing resumed after `THREADS_SUSPENDED`
pub const THREADS_RESUMED: u8 = 8;

/// A thread was registered with the tracer
///
/// Written once per thread, before its first call-graph event.
pub const THREAD_CREATED: u8 = 9;

// ============================================================================
// Payload Tags
// ============================================================================

/// No return value attached
pub const PAYLOAD_NONE: u8 = 0;
/// `payload` is 0 or 1
pub const PAYLOAD_BOOL: u8 = 1;
/// `payload` is a Unicode scalar value
pub const PAYLOAD_CHAR: u8 = 2;
/// `payload` is the bit pattern of an `i64`
pub const PAYLOAD_INT: u8 = 3;
/// `payload` is the bit pattern of an `f64`
pub const PAYLOAD_FLOAT: u8 = 4;
/// `payload` is an opaque object identity (e.g. an identity hash)
pub const PAYLOAD_OBJECT: u8 = 5;

/// Size of one encoded record in bytes
pub const RECORD_SIZE: usize = 24;

/// Method id used by records that are not tied to a method (markers, thread creation)
pub const NO_METHOD: u16 = 0;

/// Thread number used by records written on behalf of all threads
pub const NO_THREAD: u32 = 0;

// ============================================================================
// Errors
// ============================================================================

/// Failure to interpret a record produced by another version or corrupted in transit
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown event kind {0}")]
    UnknownKind(u8),

    #[error("unknown payload tag {0}")]
    UnknownPayloadTag(u8),

    #[error("payload {0:#x} is not a valid char")]
    InvalidChar(u64),

    #[error("record truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

// ============================================================================
// Event Kinds
// ============================================================================

/// Typed view of the kind byte of a [`TraceRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    RootEntry = ROOT_ENTRY,
    RootExit = ROOT_EXIT,
    MethodEntry = METHOD_ENTRY,
    MethodExit = METHOD_EXIT,
    MarkerEntry = MARKER_ENTRY,
    MarkerExit = MARKER_EXIT,
    ThreadsSuspended = THREADS_SUSPENDED,
    ThreadsResumed = THREADS_RESUMED,
    ThreadCreated = THREAD_CREATED,
}

impl EventKind {
    /// Raw kind byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Entry of a root, method or marker frame
    #[must_use]
    pub const fn is_entry(self) -> bool {
        matches!(self, Self::RootEntry | Self::MethodEntry | Self::MarkerEntry)
    }

    /// Exit of a root, method or marker frame (the only kinds that may carry a payload)
    #[must_use]
    pub const fn is_exit(self) -> bool {
        matches!(self, Self::RootExit | Self::MethodExit | Self::MarkerExit)
    }

    /// Records written by the profiler itself rather than by a traced call
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::ThreadsSuspended | Self::ThreadsResumed | Self::ThreadCreated)
    }

    /// Short upper-case name, as used in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RootEntry => "ROOT_ENTRY",
            Self::RootExit => "ROOT_EXIT",
            Self::MethodEntry => "METHOD_ENTRY",
            Self::MethodExit => "METHOD_EXIT",
            Self::MarkerEntry => "MARKER_ENTRY",
            Self::MarkerExit => "MARKER_EXIT",
            Self::ThreadsSuspended => "THREADS_SUSPENDED",
            Self::ThreadsResumed => "THREADS_RESUMED",
            Self::ThreadCreated => "THREAD_CREATED",
        }
    }
}

impl TryFrom<u8> for EventKind {
    type Error = DecodeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            ROOT_ENTRY => Self::RootEntry,
            ROOT_EXIT => Self::RootExit,
            METHOD_ENTRY => Self::MethodEntry,
            METHOD_EXIT => Self::MethodExit,
            MARKER_ENTRY => Self::MarkerEntry,
            MARKER_EXIT => Self::MarkerExit,
            THREADS_SUSPENDED => Self::ThreadsSuspended,
            THREADS_RESUMED => Self::ThreadsResumed,
            THREAD_CREATED => Self::ThreadCreated,
            other => return Err(DecodeError::UnknownKind(other)),
        })
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Return Values
// ============================================================================

/// Return value captured at a method exit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReturnValue {
    Bool(bool),
    Char(char),
    Int(i64),
    Float(f64),
    /// Opaque identity of a returned object
    Object(u64),
}

impl ReturnValue {
    /// Split into `(payload_tag, payload)`
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn to_raw(self) -> (u8, u64) {
        match self {
            Self::Bool(b) => (PAYLOAD_BOOL, u64::from(b)),
            Self::Char(c) => (PAYLOAD_CHAR, u64::from(u32::from(c))),
            Self::Int(i) => (PAYLOAD_INT, i as u64),
            Self::Float(x) => (PAYLOAD_FLOAT, x.to_bits()),
            Self::Object(id) => (PAYLOAD_OBJECT, id),
        }
    }

    /// Rebuild from `(payload_tag, payload)`; `PAYLOAD_NONE` yields `None`
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown tag or an out-of-range char.
    #[allow(clippy::cast_possible_wrap)]
    pub fn from_raw(tag: u8, payload: u64) -> Result<Option<Self>, DecodeError> {
        let value = match tag {
            PAYLOAD_NONE => return Ok(None),
            PAYLOAD_BOOL => Self::Bool(payload != 0),
            PAYLOAD_CHAR => u32::try_from(payload)
                .ok()
                .and_then(char::from_u32)
                .map(Self::Char)
                .ok_or(DecodeError::InvalidChar(payload))?,
            PAYLOAD_INT => Self::Int(payload as i64),
            PAYLOAD_FLOAT => Self::Float(f64::from_bits(payload)),
            PAYLOAD_OBJECT => Self::Object(payload),
            other => return Err(DecodeError::UnknownPayloadTag(other)),
        };
        Ok(Some(value))
    }
}

// ============================================================================
// Compact Record
// ============================================================================

/// Event record as stored in the event buffer
///
/// **Memory Layout**: `#[repr(C)]`, fields ordered largest first so there is
/// no padding. **Size**: 24 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceRecord {
    /// Nanoseconds since the tracer's epoch (monotonic)
    pub timestamp_ns: u64,

    /// Return value bits, interpreted according to `payload_tag`
    pub payload: u64,

    /// Compact thread number assigned at registration (`NO_THREAD` for global markers)
    pub thread_no: u32,

    /// Method id from the instrumentation's id space (`NO_METHOD` when not applicable)
    pub method_id: u16,

    /// One of the event kind constants (`ROOT_ENTRY`, ...)
    pub kind: u8,

    /// One of the `PAYLOAD_*` constants
    pub payload_tag: u8,
}

const _: () = assert!(core::mem::size_of::<TraceRecord>() == RECORD_SIZE);

impl TraceRecord {
    /// Typed event kind
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownKind`] for bytes outside the known kinds.
    pub fn event_kind(&self) -> Result<EventKind, DecodeError> {
        EventKind::try_from(self.kind)
    }

    /// Attached return value, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the payload tag or char payload is invalid.
    pub fn return_value(&self) -> Result<Option<ReturnValue>, DecodeError> {
        ReturnValue::from_raw(self.payload_tag, self.payload)
    }

    /// Little-endian byte form
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        out[8..16].copy_from_slice(&self.payload.to_le_bytes());
        out[16..20].copy_from_slice(&self.thread_no.to_le_bytes());
        out[20..22].copy_from_slice(&self.method_id.to_le_bytes());
        out[22] = self.kind;
        out[23] = self.payload_tag;
        out
    }

    /// Parse the first [`RECORD_SIZE`] bytes of `bytes`, validating kind and payload
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] on short input, or a kind/payload error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let Some(raw) = bytes.get(..RECORD_SIZE) else {
            return Err(DecodeError::Truncated { expected: RECORD_SIZE, actual: bytes.len() });
        };

        let mut u64_buf = [0u8; 8];
        let mut u32_buf = [0u8; 4];
        let mut u16_buf = [0u8; 2];

        u64_buf.copy_from_slice(&raw[0..8]);
        let timestamp_ns = u64::from_le_bytes(u64_buf);
        u64_buf.copy_from_slice(&raw[8..16]);
        let payload = u64::from_le_bytes(u64_buf);
        u32_buf.copy_from_slice(&raw[16..20]);
        let thread_no = u32::from_le_bytes(u32_buf);
        u16_buf.copy_from_slice(&raw[20..22]);
        let method_id = u16::from_le_bytes(u16_buf);

        let record = Self {
            timestamp_ns,
            payload,
            thread_no,
            method_id,
            kind: raw[22],
            payload_tag: raw[23],
        };
        record.event_kind()?;
        record.return_value()?;
        Ok(record)
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// Build the compact record for one event.
///
/// Pure and allocation-free so it can run on the hook path. A return value is
/// only attached to exit kinds; for every other kind it is ignored.
#[must_use]
pub fn encode(
    kind: EventKind,
    method_id: u16,
    thread_no: u32,
    timestamp_ns: u64,
    ret: Option<ReturnValue>,
) -> TraceRecord {
    let (payload_tag, payload) = match ret {
        Some(value) if kind.is_exit() => value.to_raw(),
        _ => (PAYLOAD_NONE, 0),
    };

    TraceRecord { timestamp_ns, payload, thread_no, method_id, kind: kind.as_u8(), payload_tag }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sets_fields() {
        let rec = encode(EventKind::MethodEntry, 42, 3, 1_000, None);
        assert_eq!(rec.kind, METHOD_ENTRY);
        assert_eq!(rec.method_id, 42);
        assert_eq!(rec.thread_no, 3);
        assert_eq!(rec.timestamp_ns, 1_000);
        assert_eq!(rec.payload_tag, PAYLOAD_NONE);
    }

    #[test]
    fn test_encode_drops_payload_on_entry_kinds() {
        let rec = encode(EventKind::RootEntry, 1, 1, 0, Some(ReturnValue::Int(7)));
        assert_eq!(rec.payload_tag, PAYLOAD_NONE);
        assert_eq!(rec.payload, 0);
        assert_eq!(rec.return_value(), Ok(None));
    }

    #[test]
    fn test_encode_keeps_payload_on_exit_kinds() {
        let rec = encode(EventKind::MethodExit, 1, 1, 0, Some(ReturnValue::Int(-7)));
        assert_eq!(rec.payload_tag, PAYLOAD_INT);
        assert_eq!(rec.return_value(), Ok(Some(ReturnValue::Int(-7))));
    }

    #[test]
    fn test_record_bytes_roundtrip() {
        let rec = encode(EventKind::MarkerExit, 0xBEEF, 77, 123_456_789, Some(ReturnValue::Char('λ')));
        let bytes = rec.to_bytes();
        assert_eq!(TraceRecord::from_bytes(&bytes), Ok(rec));
    }

    #[test]
    fn test_from_bytes_rejects_short_input() {
        let err = TraceRecord::from_bytes(&[0u8; 10]).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { expected: RECORD_SIZE, actual: 10 });
    }

    #[test]
    fn test_from_bytes_rejects_unknown_kind() {
        let mut bytes = encode(EventKind::RootEntry, 1, 1, 0, None).to_bytes();
        bytes[22] = 200;
        assert_eq!(TraceRecord::from_bytes(&bytes), Err(DecodeError::UnknownKind(200)));
    }

    #[test]
    fn test_invalid_char_payload() {
        assert_eq!(
            ReturnValue::from_raw(PAYLOAD_CHAR, 0xD800),
            Err(DecodeError::InvalidChar(0xD800))
        );
    }

    #[test]
    fn test_kind_classification() {
        assert!(EventKind::RootEntry.is_entry());
        assert!(EventKind::MarkerExit.is_exit());
        assert!(EventKind::ThreadsSuspended.is_control());
        assert!(!EventKind::MethodExit.is_control());
        assert_eq!(EventKind::try_from(THREAD_CREATED), Ok(EventKind::ThreadCreated));
    }
}
