//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "calltrace",
    about = "Run a synthetic instrumented workload through the call-tracing runtime",
    after_help = "\
EXAMPLES:
    calltrace --export trace.json                   Default workload, Chrome trace output
    calltrace --threads 8 --depth 6 --depth-limit 3 Deep calls, record only 3 levels
    calltrace --suspend-midway --capture-returns    Exercise suspend/resume and return values
    calltrace --config tracer.json                  Tracer settings from a JSON file"
)]
pub struct Args {
    /// Worker threads running the workload
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Call-tree depth below the root method
    #[arg(short, long, default_value = "4")]
    pub depth: u32,

    /// Calls made at each level of the call tree
    #[arg(long, default_value = "2")]
    pub fanout: u32,

    /// Batches run by each worker thread
    #[arg(short, long, default_value = "10")]
    pub iterations: u32,

    /// Do not wrap roots in a marker method
    #[arg(long)]
    pub no_marker: bool,

    /// Deepest frame recorded (overrides --config)
    #[arg(long, value_name = "DEPTH")]
    pub depth_limit: Option<u32>,

    /// Threads admitted for tracing (overrides --config)
    #[arg(long, value_name = "N")]
    pub thread_slots: Option<u32>,

    /// Event buffer capacity in records (overrides --config)
    #[arg(long, value_name = "RECORDS")]
    pub buffer_capacity: Option<usize>,

    /// Record return values on exit events
    #[arg(long)]
    pub capture_returns: bool,

    /// Tracer configuration file (JSON)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Export trace to file (Chrome Trace Event Format)
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Suspend tracing halfway through and resume after one batch
    #[arg(long)]
    pub suspend_midway: bool,

    /// Collector poll interval in milliseconds
    #[arg(long, default_value = "10")]
    pub poll_ms: u64,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
