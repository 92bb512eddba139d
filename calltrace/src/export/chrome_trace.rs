use calltrace_common::{EventKind, ReturnValue, TraceRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{Event, ExportError, MethodId, ThreadNo, Timestamp};

/// Chrome Trace Event format
/// Format reference: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Method name, or `M#<id>` when no name is known
    name: String,
    /// "root", "method", "marker" or "tracer"
    cat: String,
    /// Phase: "B" = begin, "E" = end, "i" = instant, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    pid: u32,
    tid: u32,
    /// Instant event scope ("g" = global)
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Chrome trace exporter for timeline visualization
///
/// Entry/exit pairs become B/E slices on the thread's track, suspension
/// markers become global instant events, and every thread seen gets a
/// `thread_name` metadata record.
pub struct ChromeTraceExporter {
    events: Vec<ChromeTraceEvent>,
    method_names: HashMap<MethodId, String>,
    thread_names: HashMap<ThreadNo, String>,
    threads_seen: BTreeSet<ThreadNo>,
    /// First timestamp seen, everything is exported relative to it
    start_timestamp_ns: Option<u64>,
    pid: u32,
}

impl ChromeTraceExporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            method_names: HashMap::new(),
            thread_names: HashMap::new(),
            threads_seen: BTreeSet::new(),
            start_timestamp_ns: None,
            pid: std::process::id(),
        }
    }

    /// Human-readable name for a method id
    pub fn set_method_name(&mut self, method: MethodId, name: impl Into<String>) {
        self.method_names.insert(method, name.into());
    }

    pub fn set_thread_name(&mut self, thread: ThreadNo, name: impl Into<String>) {
        self.thread_names.insert(thread, name.into());
    }

    /// Decode and add a raw buffered record
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Decode`] for a malformed record; nothing is added.
    pub fn add_record(&mut self, record: &TraceRecord) -> Result<(), ExportError> {
        let event = Event::decode(record)?;
        self.add_event(&event);
        Ok(())
    }

    /// Add a decoded event to the trace
    pub fn add_event(&mut self, event: &Event) {
        let start_ts = *self.start_timestamp_ns.get_or_insert(event.timestamp.0);
        let ts_us = Timestamp(event.timestamp.0.saturating_sub(start_ts)).as_micros_f64();
        let tid = event.thread.0;

        let (ph, cat, scope) = match event.kind {
            EventKind::RootEntry => ("B", "root", None),
            EventKind::RootExit => ("E", "root", None),
            EventKind::MethodEntry => ("B", "method", None),
            EventKind::MethodExit => ("E", "method", None),
            EventKind::MarkerEntry => ("B", "marker", None),
            EventKind::MarkerExit => ("E", "marker", None),
            EventKind::ThreadsSuspended | EventKind::ThreadsResumed => {
                ("i", "tracer", Some("g".to_string()))
            }
            EventKind::ThreadCreated => {
                self.threads_seen.insert(event.thread);
                return;
            }
        };
        if event.thread != ThreadNo::ALL {
            self.threads_seen.insert(event.thread);
        }

        let name = if event.kind.is_control() {
            event.kind.name().to_string()
        } else {
            self.method_name(event.method)
        };

        let args = event.ret.map(|ret| {
            let mut args = HashMap::new();
            args.insert("return".to_string(), return_value_json(ret));
            args
        });

        self.events.push(ChromeTraceEvent {
            name,
            cat: cat.to_string(),
            ph: ph.to_string(),
            ts: ts_us,
            pid: self.pid,
            tid,
            s: scope,
            args,
        });
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if serialization or the underlying write fails.
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut all_events = self.events.clone();

        for thread in &self.threads_seen {
            let name = self
                .thread_names
                .get(thread)
                .cloned()
                .unwrap_or_else(|| format!("Thread {}", thread.0));
            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(name));

            all_events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(),
                ts: 0.0,
                pid: self.pid,
                tid: thread.0,
                s: None,
                args: Some(args),
            });
        }

        let trace = ChromeTrace {
            trace_events: all_events,
            display_time_unit: "ms".to_string(),
        };
        serde_json::to_writer_pretty(writer, &trace)?;
        Ok(())
    }

    /// Write the trace to `path`, creating or truncating the file
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if the file cannot be created or flushed.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.export(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Get the number of events collected
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    fn method_name(&self, method: MethodId) -> String {
        self.method_names
            .get(&method)
            .cloned()
            .unwrap_or_else(|| method.to_string())
    }
}

impl Default for ChromeTraceExporter {
    fn default() -> Self {
        Self::new()
    }
}

fn return_value_json(ret: ReturnValue) -> JsonValue {
    match ret {
        ReturnValue::Bool(b) => serde_json::json!(b),
        ReturnValue::Char(c) => serde_json::json!(c.to_string()),
        ReturnValue::Int(i) => serde_json::json!(i),
        ReturnValue::Float(x) => serde_json::json!(x),
        ReturnValue::Object(id) => serde_json::json!(format!("object@{id:#x}")),
    }
}
