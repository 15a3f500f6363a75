// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// `[executor]` section, also usable on its own to build an
/// [`Executor`](crate::executor::Executor).
///
/// ```toml
/// [executor]
/// workers = 8
/// poll_interval_ms = 5
/// detect_cycles = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker threads in the pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on how long an idle worker sleeps before re-scanning.
    ///
    /// Workers are normally woken as soon as something changes; this is the
    /// fallback poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Reject dependency edges that would close a cycle.
    ///
    /// With this off, a cycle is accepted and its tasks never run.
    #[serde(default = "default_detect_cycles")]
    pub detect_cycles: bool,
}

/// Available parallelism, clamped to 1..=16.
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .clamp(1, 16)
}

fn default_poll_interval_ms() -> u64 {
    5
}

fn default_detect_cycles() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            detect_cycles: default_detect_cycles(),
        }
    }
}

impl ExecutorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `[task.<name>]` section of a graph file.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command to run.
    pub cmd: String,

    /// Tasks that must complete before this one starts.
    #[serde(default)]
    pub after: Vec<String>,

    /// Free-form tag shown in logs.
    #[serde(default)]
    pub label: Option<String>,
}

/// Graph file exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [executor]
/// workers = 4
///
/// [task.build]
/// cmd = "make"
///
/// [task.test]
/// cmd = "make test"
/// after = ["build"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawGraphFile {
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Keys are task names.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated graph file: known dependencies, no cycles, sane executor
/// settings. Obtain one with `GraphConfig::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub executor: ExecutorConfig,
    pub task: BTreeMap<String, TaskConfig>,
}

impl GraphConfig {
    pub(crate) fn new_unchecked(
        executor: ExecutorConfig,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self { executor, task }
    }
}
