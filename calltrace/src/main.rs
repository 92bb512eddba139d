//! # calltrace - Main Entry Point
//!
//! Drives a synthetic multi-threaded workload through the tracing hooks while
//! a collector thread drains the event buffer, then optionally writes the
//! trace as Chrome Trace Event JSON (`--export trace.json`).

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use calltrace::cli::Args;
use calltrace::collector::Collector;
use calltrace::export::ChromeTraceExporter;
use calltrace::runtime::FirstInvokeHandler;
use calltrace::workload::{ExpansionLog, Workload, MAX_DEPTH};
use calltrace::{Tracer, TracerConfig};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("invalid argument") || msg.contains("invalid configuration") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Tracer settings: config file (or defaults), then command-line overrides.
fn load_config(args: &Args) -> Result<TracerConfig> {
    let mut config = match &args.config {
        Some(path) => TracerConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TracerConfig::default(),
    };
    if let Some(limit) = args.depth_limit {
        config.stack_depth_limit = limit;
    }
    if let Some(slots) = args.thread_slots {
        config.profiled_threads_allowed = slots;
    }
    if let Some(capacity) = args.buffer_capacity {
        config.buffer_capacity = capacity;
    }
    if args.capture_returns {
        config.capture_return_values = true;
    }
    config.validate()?;
    Ok(config)
}

fn workload_from(args: &Args) -> Result<Workload> {
    if args.threads == 0 {
        anyhow::bail!("Invalid argument: --threads must be at least 1");
    }
    if args.depth > MAX_DEPTH {
        anyhow::bail!("Invalid argument: --depth must be at most {MAX_DEPTH}");
    }
    Ok(Workload {
        threads: args.threads,
        depth: args.depth,
        fanout: args.fanout,
        iterations: args.iterations,
        use_marker: !args.no_marker,
        suspend_midway: args.suspend_midway,
    })
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let workload = workload_from(&args)?;

    let expansions = Arc::new(ExpansionLog::default());
    let tracer = Arc::new(
        Tracer::new(&config)?
            .with_first_invoke_handler(Arc::clone(&expansions) as Arc<dyn FirstInvokeHandler>),
    );

    let exporter = args.export.as_ref().map(|_| {
        let mut exporter = ChromeTraceExporter::new();
        for (method, name) in workload.method_names() {
            exporter.set_method_name(method, name);
        }
        exporter
    });

    let stop = Arc::new(AtomicBool::new(false));
    let poll = Duration::from_millis(args.poll_ms.max(1));
    let collector_handle = {
        let tracer = Arc::clone(&tracer);
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("calltrace-collector".to_string())
            .spawn(move || {
                let mut collector = Collector::new(tracer, exporter, None);
                collector.run(&stop, poll);
                collector
            })
            .context("Failed to spawn collector thread")?
    };

    info!(
        "running workload: {} threads, depth {}, fanout {}, {} iterations",
        workload.threads, workload.depth, workload.fanout, workload.iterations
    );
    let start = Instant::now();
    let workload_result = workload.run(&tracer);
    let elapsed = start.elapsed();

    stop.store(true, Ordering::Release);
    let mut collector = collector_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Collector thread panicked"))?;
    workload_result?;

    if let Some(path) = &args.export {
        collector.sync_thread_names();
        if let Some(exporter) = collector.take_exporter() {
            exporter
                .export_to_file(path)
                .with_context(|| format!("Failed to write trace to {}", path.display()))?;
            if !args.quiet {
                println!("Wrote {} events to {}", exporter.event_count(), path.display());
            }
        }
    }

    if !args.quiet {
        let stats = tracer.stats();
        let collected = &collector.stats;
        println!("Workload finished in {elapsed:.2?}");
        println!(
            "  threads traced:   {} (admission denied {} calls)",
            stats.threads_registered, stats.admissions_denied
        );
        println!(
            "  events written:   {} (dropped {}, sealed out {})",
            stats.events_written, stats.events_dropped, stats.events_sealed_out
        );
        println!(
            "  events collected: {} in {} batches",
            collected.records, collected.batches
        );
        println!("  suspended calls:  {}", stats.suspended_calls);
        println!(
            "  methods expanded: {} of {} invoked",
            expansions.expanded().len(),
            tracer.invoked_methods()
        );
    }
    Ok(())
}
