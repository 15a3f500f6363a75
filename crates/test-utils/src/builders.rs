#![allow(dead_code)]

use std::collections::BTreeMap;

use dagpool::config::{ExecutorConfig, GraphConfig, RawGraphFile, TaskConfig};

/// Builder for `RawGraphFile` / `GraphConfig` to simplify test setup.
pub struct GraphFileBuilder {
    graph: RawGraphFile,
}

impl GraphFileBuilder {
    pub fn new() -> Self {
        Self {
            graph: RawGraphFile {
                executor: ExecutorConfig::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.graph.task.insert(name.to_string(), task);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.graph.executor.workers = workers;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.graph.executor.poll_interval_ms = ms;
        self
    }

    /// The unvalidated file, for tests that expect validation to fail.
    pub fn build_raw(self) -> RawGraphFile {
        self.graph
    }

    pub fn build(self) -> GraphConfig {
        GraphConfig::try_from(self.graph).expect("Failed to build valid graph from builder")
    }
}

impl Default for GraphFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: cmd.to_string(),
                after: vec![],
                label: None,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.task.label = Some(label.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Executor settings with `workers` threads and a short fallback poll.
pub fn executor_config(workers: usize) -> ExecutorConfig {
    ExecutorConfig {
        workers,
        poll_interval_ms: 2,
        detect_cycles: true,
    }
}
