// src/executor/task.rs

//! Task records, handles and read-only views.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Opaque handle referencing a task inside one executor's table.
///
/// Ids start at 1, increase monotonically and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Externally observable task state.
///
/// `Ready -> Running -> Completed | Failed`. A task whose dependency failed
/// goes straight from `Ready` to `Failed` without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Ready,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Stored cause of a task failure.
///
/// Cheap to clone so every waiter on the same task gets its own copy.
#[derive(Clone)]
pub struct TaskFailure(Arc<str>);

impl TaskFailure {
    pub(crate) fn from_error(err: &anyhow::Error) -> Self {
        // `{:#}` keeps the whole context chain on one line.
        Self(Arc::from(format!("{err:#}")))
    }

    pub(crate) fn from_message(message: impl Into<String>) -> Self {
        Self(Arc::from(message.into()))
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::from_message(format!("task panicked: {msg}"))
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskFailure").field(&&*self.0).finish()
    }
}

/// The work a task runs. An `Err` marks the task failed.
pub type Work = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Runs on the worker thread right after the task's work succeeds.
///
/// Keep it short and non-blocking: the worker picks up nothing else until
/// it returns.
pub type CompletionCallback = Box<dyn FnOnce(TaskId) + Send + 'static>;

/// Optional settings applied atomically at submission time.
#[derive(Default)]
pub struct TaskOptions {
    pub(crate) after: Vec<TaskId>,
    pub(crate) label: Option<String>,
    pub(crate) on_complete: Option<CompletionCallback>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run only after `dep` has completed.
    pub fn after(mut self, dep: TaskId) -> Self {
        self.after.push(dep);
        self
    }

    pub fn after_all(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.after.extend(deps);
        self
    }

    /// Opaque tag carried in logs and [`TaskInfo`]; no effect on scheduling.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(TaskId) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("after", &self.after)
            .field("label", &self.label)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// A task as stored in the executor's table (internal).
pub(crate) struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
    /// Taken by the worker that claims the task.
    pub work: Option<Work>,
    pub on_complete: Option<CompletionCallback>,
    pub deps: Vec<TaskId>,
    /// Tasks that listed this one as a dependency.
    pub dependents: Vec<TaskId>,
    pub label: Option<String>,
    pub failure: Option<TaskFailure>,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl TaskRecord {
    pub fn new(id: TaskId, work: Work, label: Option<String>) -> Self {
        Self {
            id,
            status: TaskStatus::Ready,
            work: Some(work),
            on_complete: None,
            deps: Vec::new(),
            dependents: Vec::new(),
            label,
            failure: None,
            created_at: Instant::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Read-only snapshot of a task, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub status: TaskStatus,
    pub label: Option<String>,
    pub deps: Vec<TaskId>,
    pub failure: Option<TaskFailure>,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl TaskInfo {
    pub(crate) fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            label: record.label.clone(),
            deps: record.deps.clone(),
            failure: record.failure.clone(),
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }

    /// Wall-clock time between pickup and the terminal transition.
    ///
    /// `None` for tasks that never ran (including dependency failures).
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }
}

/// Counters over the executor's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Sum of the run durations of every task that actually ran.
    pub total_execution_time: Duration,
}

impl ExecutorStats {
    /// Tasks that are neither completed nor failed.
    pub fn unfinished(&self) -> u64 {
        self.submitted - self.completed - self.failed
    }
}
