//! # calltrace - In-Process Call Tracing Runtime
//!
//! calltrace is the runtime half of an instrumenting profiler. A rewriter
//! (not part of this crate) injects hook calls at the entry and exit of
//! selected methods; the hooks reconstruct each thread's call stack, decide
//! which calls are worth recording and append compact timestamped records to
//! a shared buffer that a collector drains asynchronously.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Instrumented Application Threads                │
//! │        root_entry / method_entry / marker_entry / *_exit        │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ hook calls (hot path)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Tracer (runtime)                         │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Suspend    │──▶│ ThreadState  │──▶│  Activation  │         │
//! │  │   Barrier    │   │  (registry)  │   │    Table     │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │ encode                             │
//! │                            ▼                                    │
//! │                     ┌──────────────┐                            │
//! │                     │ EventBuffer  │── signals ──┐              │
//! │                     └──────────────┘             │              │
//! └──────────────────────────────────────────────────┼──────────────┘
//!                                                    ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Collector (own thread) ──▶ decode ──▶ Chrome trace export      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`runtime`]: the hook hot path and its shared state
//!   - `tracer` / `hooks`: entry points and `suspend_all` / `resume_all` / `reset_all`
//!   - `thread_state` / `registry`: per-thread stack state, admission
//!   - `activation`: first-invocation tracking for lazy instrumentation
//!   - `buffer`: bounded record buffer with collector wake-ups
//!   - `global`: process-wide tracer for handle-less injected calls
//!
//! - [`collector`]: drains the buffer, decodes records, keeps statistics
//!
//! - [`export`]: Chrome Trace Event Format JSON
//!   - Compatible with Perfetto, Speedscope, Chrome's `chrome://tracing`
//!
//! - [`config`]: tracer configuration (JSON loadable)
//!
//! - [`domain`]: Core domain types (`MethodId`, `ThreadNo`, `Timestamp`, `Event`) and errors
//!
//! - [`workload`]: synthetic instrumented workload used by the `calltrace` binary
//!
//! - [`cli`]: Command-line argument parsing
//!
//! ## Key Concepts
//!
//! - **Root method**: entry point of a traced call subtree
//! - **Marker method**: brackets a subtree of interest without being a root
//! - **Depth cap**: frames deeper than the limit are tracked but not recorded
//! - **Suspension**: pauses every hook; the buffer carries a
//!   `THREADS_SUSPENDED` / `THREADS_RESUMED` marker pair around the gap

pub mod cli;
pub mod collector;
pub mod config;
pub mod domain;
pub mod export;
pub mod runtime;
pub mod workload;

pub use config::{ResetParams, TracerConfig};
pub use runtime::Tracer;
