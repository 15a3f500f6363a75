// src/runner.rs

//! Runs a validated task-graph file on an [`Executor`].
//!
//! Every `[task.<name>]` becomes one executor task whose work is its shell
//! command. Tasks are submitted in dependency order with their `after`
//! edges attached atomically, so a dependent can never start early.

use std::collections::HashMap;
use std::process::{Command, Output};

use anyhow::{Context, bail};
use tracing::{debug, info};

use crate::config::{ExecutorConfig, GraphConfig};
use crate::errors::Result;
use crate::executor::{Executor, TaskId, TaskOptions, TaskStatus};

/// Outcome of one graph run, by task name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: Vec<String>,
    /// Failed tasks with their failure cause.
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Execute every task in `graph` once and wait for all of them.
pub fn run_graph(graph: &GraphConfig, executor_config: ExecutorConfig) -> Result<RunSummary> {
    let executor = Executor::new(executor_config)?;
    let mut ids: HashMap<&str, TaskId> = HashMap::new();

    for name in graph.topological_order() {
        let Some(task) = graph.task.get(name) else {
            continue;
        };

        let deps = task.after.iter().filter_map(|dep| ids.get(dep.as_str()).copied());
        let options = TaskOptions::new()
            .after_all(deps)
            .label(task.label.clone().unwrap_or_else(|| name.to_string()));

        let task_name = name.to_string();
        let cmd = task.cmd.clone();
        let id = executor.submit_with(move || run_command(&task_name, &cmd), options)?;

        debug!(task = %name, id = %id, "graph task submitted");
        ids.insert(name, id);
    }

    executor.wait_for_all()?;

    let mut summary = RunSummary::default();
    for (name, id) in &ids {
        let info = executor.task_info(*id)?;
        match info.status {
            TaskStatus::Completed => summary.completed.push(name.to_string()),
            _ => {
                let cause = info
                    .failure
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| format!("task ended {}", info.status));
                summary.failed.push((name.to_string(), cause));
            }
        }
    }
    summary.completed.sort();
    summary.failed.sort();

    let stats = executor.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        busy = ?stats.total_execution_time,
        "graph run finished"
    );

    executor.shutdown();
    Ok(summary)
}

/// Run one shell command to completion; a non-zero exit fails the task.
fn run_command(task: &str, cmd: &str) -> anyhow::Result<()> {
    info!(task = %task, cmd = %cmd, "starting task process");

    let output = shell(cmd)
        .output()
        .with_context(|| format!("spawning process for task '{task}'"))?;

    log_output(task, &output);

    if !output.status.success() {
        match output.status.code() {
            Some(code) => bail!("command `{cmd}` exited with status {code}"),
            None => bail!("command `{cmd}` was terminated by a signal"),
        }
    }
    Ok(())
}

/// Build a shell command appropriate for the platform.
fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

fn log_output(task: &str, output: &Output) {
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!(task = %task, "stdout: {}", line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        debug!(task = %task, "stderr: {}", line);
    }
}
