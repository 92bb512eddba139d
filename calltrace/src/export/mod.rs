//! Trace export functionality
//!
//! Renders collected events in Chrome Trace Event Format for visualization in
//! chrome://tracing or Perfetto.

pub mod chrome_trace;

pub use chrome_trace::ChromeTraceExporter;
