// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_graph_path;

/// Command-line arguments for `dagpool`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagpool",
    version,
    about = "Run a dependency graph of shell commands on a fixed pool of worker threads.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the task-graph file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_graph_path())]
    pub graph: PathBuf,

    /// Number of worker threads; overrides `[executor].workers` and
    /// `DAGPOOL_WORKERS`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGPOOL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the graph, but don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
