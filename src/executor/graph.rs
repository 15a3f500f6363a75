// src/executor/graph.rs

//! The executor's task table and dependency-readiness logic.
//!
//! Everything here runs under the executor's single coarse lock, so none of
//! it needs its own synchronisation. The table keeps:
//!
//! - every task record ever submitted (no reaping),
//! - the ordered set of unfinished ids the readiness scan walks,
//! - a `petgraph` mirror of the dependency edges (`dep -> task`) used for
//!   cycle detection.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::errors::{DagpoolError, Result};
use crate::executor::task::{
    CompletionCallback, ExecutorStats, TaskFailure, TaskId, TaskInfo, TaskOptions, TaskRecord,
    TaskStatus, Work,
};

/// A task a worker has just moved to `Running`.
pub(crate) struct ClaimedTask {
    pub id: TaskId,
    pub work: Work,
    pub on_complete: Option<CompletionCallback>,
    pub label: Option<String>,
}

pub(crate) struct TaskGraph {
    tasks: HashMap<TaskId, TaskRecord>,
    /// Ids that are `Ready` or `Running`, ordered for the lowest-id scan.
    unfinished: BTreeSet<TaskId>,
    edges: DiGraphMap<TaskId, ()>,
    next_id: u64,
    detect_cycles: bool,
    stats: ExecutorStats,
}

impl TaskGraph {
    pub fn new(detect_cycles: bool) -> Self {
        Self {
            tasks: HashMap::new(),
            unfinished: BTreeSet::new(),
            edges: DiGraphMap::new(),
            next_id: 1,
            detect_cycles,
            stats: ExecutorStats::default(),
        }
    }

    /// Register a new `Ready` task together with its initial dependencies.
    ///
    /// Dependencies are validated before an id is assigned, so a rejected
    /// submission leaves no trace. A task whose dependency has already
    /// failed is failed on the spot.
    pub fn insert(&mut self, work: Work, options: TaskOptions) -> Result<TaskId> {
        let TaskOptions {
            after,
            label,
            on_complete,
        } = options;

        for dep in &after {
            if !self.tasks.contains_key(dep) {
                return Err(DagpoolError::UnknownTask(*dep));
            }
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;

        let mut record = TaskRecord::new(id, work, label);
        record.on_complete = on_complete;
        self.tasks.insert(id, record);
        self.unfinished.insert(id);
        self.edges.add_node(id);
        self.stats.submitted += 1;

        for dep in after {
            if !self.deps_of(id).contains(&dep) {
                self.link(id, dep);
            }
        }

        debug!(task = %id, deps = ?self.deps_of(id), "task submitted");

        if let Some(failed_dep) = self.first_failed_dep(id) {
            self.fail_unstarted(id, failed_dep);
        }

        Ok(id)
    }

    /// Add `depends_on` to `task`'s dependencies.
    ///
    /// Returns the ids that became `Failed` because `depends_on` had already
    /// failed (empty in the common case).
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) -> Result<Vec<TaskId>> {
        let status = self.record(task)?.status;
        self.record(depends_on)?;

        if status != TaskStatus::Ready {
            return Err(DagpoolError::LateDependency { task, status });
        }

        if self.detect_cycles
            && (task == depends_on || has_path_connecting(&self.edges, task, depends_on, None))
        {
            return Err(DagpoolError::DependencyCycle { task, depends_on });
        }

        if self.deps_of(task).contains(&depends_on) {
            return Ok(Vec::new());
        }

        self.link(task, depends_on);
        debug!(task = %task, depends_on = %depends_on, "dependency added");

        if self.status_of(depends_on) == Some(TaskStatus::Failed) {
            return Ok(self.fail_unstarted(task, depends_on));
        }
        Ok(Vec::new())
    }

    /// Readiness scan: claim the lowest-id `Ready` task whose dependencies
    /// have all completed, and mark it `Running`.
    pub fn claim_next_ready(&mut self) -> Option<ClaimedTask> {
        let id = self
            .unfinished
            .iter()
            .copied()
            .find(|id| self.is_runnable(*id))?;

        let record = self.tasks.get_mut(&id)?;
        let work = match record.work.take() {
            Some(work) => work,
            None => {
                // Unreachable while the status machine holds; never re-run.
                warn!(task = %id, "ready task has no work attached; skipping");
                return None;
            }
        };
        record.status = TaskStatus::Running;
        record.started_at = Some(Instant::now());

        Some(ClaimedTask {
            id,
            work,
            on_complete: record.on_complete.take(),
            label: record.label.clone(),
        })
    }

    /// Record the terminal outcome of a task that ran.
    ///
    /// On failure every transitive dependent that has not started is failed
    /// too; their ids are returned.
    pub fn finish(&mut self, id: TaskId, outcome: std::result::Result<(), TaskFailure>) -> Vec<TaskId> {
        let Some(record) = self.tasks.get_mut(&id) else {
            warn!(task = %id, "completion for unknown task; ignoring");
            return Vec::new();
        };

        let now = Instant::now();
        record.finished_at = Some(now);
        if let Some(started) = record.started_at {
            self.stats.total_execution_time += now.duration_since(started);
        }
        self.unfinished.remove(&id);

        match outcome {
            Ok(()) => {
                record.status = TaskStatus::Completed;
                self.stats.completed += 1;
                Vec::new()
            }
            Err(cause) => {
                record.status = TaskStatus::Failed;
                record.failure = Some(cause);
                self.stats.failed += 1;
                self.mark_dependents_failed(id)
            }
        }
    }

    pub fn status_of(&self, id: TaskId) -> Option<TaskStatus> {
        self.tasks.get(&id).map(|r| r.status)
    }

    /// Terminal outcome of a task, or `None` while it is still unfinished.
    pub fn outcome_of(&self, id: TaskId) -> Result<Option<std::result::Result<(), TaskFailure>>> {
        let record = self.record(id)?;
        Ok(match record.status {
            TaskStatus::Completed => Some(Ok(())),
            TaskStatus::Failed => Some(Err(record
                .failure
                .clone()
                .unwrap_or_else(|| TaskFailure::from_message("unknown failure")))),
            TaskStatus::Ready | TaskStatus::Running => None,
        })
    }

    pub fn info(&self, id: TaskId) -> Result<TaskInfo> {
        self.record(id).map(TaskInfo::from_record)
    }

    /// Highest id handed out so far.
    pub fn last_id(&self) -> Option<TaskId> {
        (self.next_id > 1).then(|| TaskId(self.next_id - 1))
    }

    /// Whether every task with an id up to and including `max` is terminal.
    pub fn settled_through(&self, max: TaskId) -> bool {
        self.unfinished.range(..=max).next().is_none()
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats
    }

    fn record(&self, id: TaskId) -> Result<&TaskRecord> {
        self.tasks.get(&id).ok_or(DagpoolError::UnknownTask(id))
    }

    fn deps_of(&self, id: TaskId) -> &[TaskId] {
        self.tasks
            .get(&id)
            .map(|r| r.deps.as_slice())
            .unwrap_or(&[])
    }

    fn link(&mut self, task: TaskId, dep: TaskId) {
        if let Some(record) = self.tasks.get_mut(&task) {
            record.deps.push(dep);
        }
        if let Some(dep_record) = self.tasks.get_mut(&dep) {
            dep_record.dependents.push(task);
        }
        self.edges.add_edge(dep, task, ());
    }

    fn is_runnable(&self, id: TaskId) -> bool {
        let Some(record) = self.tasks.get(&id) else {
            return false;
        };
        record.status == TaskStatus::Ready
            && record
                .deps
                .iter()
                .all(|dep| self.status_of(*dep) == Some(TaskStatus::Completed))
    }

    fn first_failed_dep(&self, id: TaskId) -> Option<TaskId> {
        self.deps_of(id)
            .iter()
            .copied()
            .find(|dep| self.status_of(*dep) == Some(TaskStatus::Failed))
    }

    /// Fail a `Ready` task because `failed_dep` failed, then cascade.
    fn fail_unstarted(&mut self, id: TaskId, failed_dep: TaskId) -> Vec<TaskId> {
        let mut newly_failed = Vec::new();
        if self.fail_ready(id, failed_dep) {
            newly_failed.push(id);
            newly_failed.extend(self.mark_dependents_failed(id));
        }
        newly_failed
    }

    /// Mark all not-yet-started transitive dependents of `failed` as
    /// `Failed`. They never run.
    fn mark_dependents_failed(&mut self, failed: TaskId) -> Vec<TaskId> {
        let mut stack: Vec<(TaskId, TaskId)> = self
            .tasks
            .get(&failed)
            .map(|r| r.dependents.iter().map(|d| (*d, failed)).collect())
            .unwrap_or_default();

        let mut newly_failed = Vec::new();

        while let Some((id, cause)) = stack.pop() {
            if self.fail_ready(id, cause) {
                newly_failed.push(id);
                if let Some(record) = self.tasks.get(&id) {
                    stack.extend(record.dependents.iter().map(|d| (*d, id)));
                }
            }
        }

        newly_failed
    }

    /// Returns `true` if the task was `Ready` and is now `Failed`.
    fn fail_ready(&mut self, id: TaskId, failed_dep: TaskId) -> bool {
        let Some(record) = self.tasks.get_mut(&id) else {
            return false;
        };
        if record.status != TaskStatus::Ready {
            return false;
        }

        record.status = TaskStatus::Failed;
        record.failure = Some(TaskFailure::from_message(format!(
            "dependency {failed_dep} failed"
        )));
        record.finished_at = Some(Instant::now());
        // Dropping the closures here releases whatever they captured.
        record.work = None;
        record.on_complete = None;
        self.unfinished.remove(&id);
        self.stats.failed += 1;

        debug!(task = %id, dependency = %failed_dep, "failing task due to upstream failure");
        true
    }
}
