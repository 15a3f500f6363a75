// src/lib.rs

//! In-process task-graph executor.
//!
//! - [`channel::BoundedChannel`]: fixed-capacity blocking FIFO for
//!   producer/consumer handoff between threads.
//! - [`pool::WorkerPool`]: fixed set of long-lived threads running boxed
//!   jobs from a shared list.
//! - [`executor::Executor`]: runs a growing graph of tasks on a worker pool,
//!   honouring dependency edges, with blocking per-task and bulk waits.
//!
//! The `dagpool` binary ([`run`]) loads a TOML graph of shell commands and
//! runs it once on an executor.

pub mod channel;
pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod pool;
pub mod runner;

use anyhow::Result;
use tracing::{debug, info};

pub use channel::BoundedChannel;
pub use errors::DagpoolError;
pub use executor::{Executor, TaskId, TaskOptions, TaskStatus};
pub use pool::WorkerPool;

use crate::cli::CliArgs;
use crate::config::{GraphConfig, apply_env_overrides, load_and_validate};
use crate::runner::{RunSummary, run_graph};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - graph file loading and validation
/// - executor settings (file, then `DAGPOOL_WORKERS`, then `--workers`)
/// - one run of the graph on the executor
pub fn run(args: CliArgs) -> Result<RunSummary> {
    let graph = load_and_validate(&args.graph)?;

    if args.dry_run {
        print_dry_run(&graph);
        return Ok(RunSummary::default());
    }

    let mut executor_config = graph.executor.clone();
    apply_env_overrides(&mut executor_config);
    if let Some(workers) = args.workers {
        executor_config.workers = workers;
    }

    info!(
        graph = %args.graph.display(),
        tasks = graph.task.len(),
        workers = executor_config.workers,
        "running task graph"
    );

    let summary = run_graph(&graph, executor_config)?;
    Ok(summary)
}

/// Simple dry-run output: print executor settings, tasks, deps and commands.
fn print_dry_run(graph: &GraphConfig) {
    println!("dagpool dry-run");
    println!("  executor.workers = {}", graph.executor.workers);
    println!(
        "  executor.poll_interval_ms = {}",
        graph.executor.poll_interval_ms
    );
    println!("  executor.detect_cycles = {}", graph.executor.detect_cycles);
    println!();

    println!("tasks ({}), in run order:", graph.task.len());
    for name in graph.topological_order() {
        let Some(task) = graph.task.get(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(ref label) = task.label {
            println!("      label: {label}");
        }
    }

    debug!("dry-run complete (no execution)");
}
