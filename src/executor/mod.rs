// src/executor/mod.rs

//! Dependency-aware task executor.
//!
//! - [`task`] holds task handles, statuses and the read-only views.
//! - [`graph`] is the task table plus the readiness scan, behind one lock.
//! - [`worker`] is the loop each pool thread runs for the executor.
//!
//! Each task runs exactly once, on some pool thread, and only after every
//! dependency has completed. When a task fails, its not-yet-started
//! dependents fail with it so that waiting on an acyclic graph always
//! terminates.
//!
//! There is no cancellation of running work. [`Executor::shutdown`] is the
//! only global stop signal: it refuses new submissions and pickups and wakes
//! every blocked waiter.

pub mod graph;
pub mod task;
pub mod worker;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::errors::{DagpoolError, Result};
use crate::pool::WorkerPool;

use self::graph::TaskGraph;

pub use task::{
    CompletionCallback, ExecutorStats, TaskFailure, TaskId, TaskInfo, TaskOptions, TaskStatus,
    Work,
};

/// State shared between the executor handle and its workers.
pub(crate) struct Shared {
    pub graph: Mutex<TaskGraph>,
    /// Signalled whenever a task might have become runnable.
    pub work_ready: Condvar,
    /// Signalled whenever a task reached a terminal state.
    pub settled: Condvar,
    pub shutdown: AtomicBool,
    pub poll_interval: Duration,
}

/// Fixed-size pool of workers running a growing graph of tasks.
///
/// Share it between threads with `Arc<Executor>`; every method takes
/// `&self`. Dropping the executor shuts it down.
pub struct Executor {
    shared: Arc<Shared>,
    pool: WorkerPool,
    config: ExecutorConfig,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Start an executor with the given configuration.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;

        let poll_interval = config.poll_interval();
        let shared = Arc::new(Shared {
            graph: Mutex::new(TaskGraph::new(config.detect_cycles)),
            work_ready: Condvar::new(),
            settled: Condvar::new(),
            shutdown: AtomicBool::new(false),
            poll_interval,
        });

        let pool = WorkerPool::new(config.workers, poll_interval)?;

        // One runner per thread: a runner only returns on shutdown, so each
        // thread ends up owning exactly one.
        for worker in 0..config.workers {
            let runner_shared = Arc::clone(&shared);
            if let Err(err) = pool.schedule(move || worker::run_worker(worker, runner_shared)) {
                shared.shutdown.store(true, Ordering::Release);
                shared.work_ready.notify_all();
                return Err(err);
            }
        }

        info!(
            workers = config.workers,
            detect_cycles = config.detect_cycles,
            "executor started"
        );

        Ok(Self {
            shared,
            pool,
            config,
        })
    }

    /// Start an executor with `workers` threads and default settings.
    pub fn with_workers(workers: usize) -> Result<Self> {
        Self::new(ExecutorConfig {
            workers,
            ..ExecutorConfig::default()
        })
    }

    /// Register `work` as a new `Ready` task with no dependencies.
    ///
    /// Returns immediately; the work may start on any worker right away.
    /// To give the task dependencies before a worker can see it, use
    /// [`Executor::submit_with`] or [`Executor::submit_after`].
    pub fn submit<F>(&self, work: F) -> Result<TaskId>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.submit_with(work, TaskOptions::default())
    }

    /// Register `work` to run once every task in `deps` has completed.
    pub fn submit_after<F>(&self, work: F, deps: &[TaskId]) -> Result<TaskId>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.submit_with(work, TaskOptions::new().after_all(deps.iter().copied()))
    }

    /// Register `work` with dependencies, label and completion callback
    /// applied atomically.
    pub fn submit_with<F>(&self, work: F, options: TaskOptions) -> Result<TaskId>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let mut graph = self.shared.graph.lock();
        if self.is_shutdown() {
            return Err(DagpoolError::ExecutorShutdown);
        }

        let id = graph.insert(Box::new(work), options)?;
        if graph.status_of(id) == Some(TaskStatus::Failed) {
            self.shared.settled.notify_all();
        } else {
            self.shared.work_ready.notify_one();
        }
        Ok(id)
    }

    /// Make `task` wait for `depends_on`.
    ///
    /// Only legal while `task` is still `Ready`; once a worker has picked it
    /// up this fails with [`DagpoolError::LateDependency`]. With cycle
    /// detection enabled, an edge that would close a cycle is rejected with
    /// [`DagpoolError::DependencyCycle`].
    pub fn add_dependency(&self, task: TaskId, depends_on: TaskId) -> Result<()> {
        let mut graph = self.shared.graph.lock();
        let newly_failed = graph.add_dependency(task, depends_on)?;
        if !newly_failed.is_empty() {
            debug!(task = %task, failed = ?newly_failed, "dependency had already failed");
            self.shared.settled.notify_all();
        }
        Ok(())
    }

    /// Block until `task` is terminal.
    ///
    /// A failed task surfaces its stored cause as
    /// [`DagpoolError::TaskFailed`]. If the executor shuts down while the
    /// task is unfinished, returns [`DagpoolError::ExecutorShutdown`].
    pub fn wait_for_task(&self, task: TaskId) -> Result<()> {
        let mut graph = self.shared.graph.lock();
        loop {
            match graph.outcome_of(task)? {
                Some(Ok(())) => return Ok(()),
                Some(Err(cause)) => return Err(DagpoolError::TaskFailed { task, cause }),
                None => {}
            }
            if self.is_shutdown() {
                return Err(DagpoolError::ExecutorShutdown);
            }
            self.shared.settled.wait(&mut graph);
        }
    }

    /// Block until every task submitted before this call is terminal.
    ///
    /// Failed tasks count as terminal; inspect them with
    /// [`Executor::task_info`] or [`Executor::wait_for_task`]. A dependency
    /// cycle (possible only with cycle detection disabled) blocks forever,
    /// or until shutdown.
    pub fn wait_for_all(&self) -> Result<()> {
        let mut graph = self.shared.graph.lock();
        let Some(last) = graph.last_id() else {
            return Ok(());
        };
        loop {
            if graph.settled_through(last) {
                return Ok(());
            }
            if self.is_shutdown() {
                return Err(DagpoolError::ExecutorShutdown);
            }
            self.shared.settled.wait(&mut graph);
        }
    }

    pub fn status(&self, task: TaskId) -> Result<TaskStatus> {
        self.shared
            .graph
            .lock()
            .status_of(task)
            .ok_or(DagpoolError::UnknownTask(task))
    }

    pub fn task_info(&self, task: TaskId) -> Result<TaskInfo> {
        self.shared.graph.lock().info(task)
    }

    pub fn stats(&self) -> ExecutorStats {
        self.shared.graph.lock().stats()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.thread_count()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting and picking up tasks, wake every waiter and join the
    /// workers.
    ///
    /// Tasks already running finish; `Ready` tasks never start. Calling it
    /// again is a no-op. When called from inside a task, the calling worker
    /// is not joined.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            let stats = {
                let graph = self.shared.graph.lock();
                self.shared.work_ready.notify_all();
                self.shared.settled.notify_all();
                graph.stats()
            };
            if stats.unfinished() > 0 {
                warn!(
                    unfinished = stats.unfinished(),
                    "executor shutting down with unfinished tasks"
                );
            }
            info!(
                completed = stats.completed,
                failed = stats.failed,
                "executor shutdown requested"
            );
        }
        self.pool.deinit();
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
