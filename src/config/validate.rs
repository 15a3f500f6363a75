// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ExecutorConfig, GraphConfig, RawGraphFile, TaskConfig};
use crate::errors::{DagpoolError, Result};

/// Longest fallback poll we accept; anything slower is almost certainly a
/// unit mistake.
const MAX_POLL_INTERVAL_MS: u64 = 1000;

impl TryFrom<RawGraphFile> for GraphConfig {
    type Error = DagpoolError;

    fn try_from(raw: RawGraphFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_graph(&raw)?;
        Ok(GraphConfig::new_unchecked(raw.executor, raw.task))
    }
}

impl ExecutorConfig {
    /// Check the settings an executor cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(DagpoolError::ConfigError(
                "[executor].workers must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(DagpoolError::ConfigError(format!(
                "[executor].poll_interval_ms must be in 1..={MAX_POLL_INTERVAL_MS} (got {})",
                self.poll_interval_ms
            )));
        }
        Ok(())
    }
}

impl GraphConfig {
    /// Task names ordered so that every task comes after its dependencies.
    pub fn topological_order(&self) -> Vec<&str> {
        // Validation already rejected cycles, so the sort cannot fail.
        toposort(&dependency_graph(&self.task), None).unwrap_or_default()
    }
}

fn validate_raw_graph(cfg: &RawGraphFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    cfg.executor.validate()?;
    validate_commands(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawGraphFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagpoolError::ConfigError(
            "graph must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_commands(cfg: &RawGraphFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(DagpoolError::ConfigError(format!(
                "task '{name}' has an empty `cmd`"
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawGraphFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(DagpoolError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(DagpoolError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawGraphFile) -> Result<()> {
    match toposort(&dependency_graph(&cfg.task), None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DagpoolError::DagCycle(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}

/// Edge direction: dep -> task. For `[task.B] after = ["A"]` we add A -> B.
fn dependency_graph(tasks: &BTreeMap<String, TaskConfig>) -> DiGraphMap<&str, ()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    graph
}
