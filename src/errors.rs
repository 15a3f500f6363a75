// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::executor::{TaskFailure, TaskId, TaskStatus};

#[derive(Error, Debug)]
pub enum DagpoolError {
    #[error("channel closed")]
    ChannelClosed,

    #[error("task {task} failed: {cause}")]
    TaskFailed { task: TaskId, cause: TaskFailure },

    #[error("executor is shut down")]
    ExecutorShutdown,

    #[error("cannot add a dependency to task {task}: it is already {status}")]
    LateDependency { task: TaskId, status: TaskStatus },

    #[error("dependency {task} -> {depends_on} would create a cycle")]
    DependencyCycle { task: TaskId, depends_on: TaskId },

    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagpoolError {
    /// The stored cause, if this error reports a failed task.
    pub fn task_failure(&self) -> Option<&TaskFailure> {
        match self {
            DagpoolError::TaskFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DagpoolError>;
