// src/pool.rs

//! Fixed-size pool of long-lived worker threads.
//!
//! Workers pull boxed jobs from one shared, lock-protected list. There is no
//! priority: jobs come out roughly in the order they were scheduled, though
//! concurrent producers may interleave.
//!
//! An idle worker sleeps for at most `poll_interval` before looking again;
//! `schedule` wakes one sleeper early.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::errors::{DagpoolError, Result};

/// A unit of work the pool can run.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolShared {
    jobs: Mutex<VecDeque<Job>>,
    job_available: Condvar,
    drained: Condvar,
    shutdown: AtomicBool,
    active: AtomicUsize,
    poll_interval: Duration,
}

impl PoolShared {
    /// Pop the next job, sleeping between checks. `None` means shut down.
    fn next_job(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            if let Some(job) = jobs.pop_front() {
                self.active.fetch_add(1, Ordering::AcqRel);
                if jobs.is_empty() {
                    self.drained.notify_all();
                }
                return Some(job);
            }
            self.job_available.wait_for(&mut jobs, self.poll_interval);
        }
    }
}

struct Worker {
    id: usize,
    thread_id: ThreadId,
    handle: JoinHandle<()>,
}

/// Worker pool with a shared job list.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<Worker>>,
    thread_count: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("thread_count", &self.thread_count)
            .field("pending_jobs", &self.pending_jobs())
            .field("active_jobs", &self.active_jobs())
            .field("shutdown", &self.shared.shutdown.load(Ordering::Acquire))
            .finish()
    }
}

impl WorkerPool {
    /// Spawn `thread_count` workers immediately.
    ///
    /// If a thread cannot be spawned, the workers started so far are shut
    /// down again and the spawn error is returned.
    pub fn new(thread_count: usize, poll_interval: Duration) -> Result<Self> {
        if thread_count == 0 {
            return Err(DagpoolError::ConfigError(
                "worker pool needs at least one thread (got 0)".to_string(),
            ));
        }

        let shared = Arc::new(PoolShared {
            jobs: Mutex::new(VecDeque::new()),
            job_available: Condvar::new(),
            drained: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            poll_interval,
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(thread_count)),
            thread_count,
        };

        for id in 0..thread_count {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("dagpool-worker-{id}"))
                .spawn(move || worker_loop(id, shared))?;
            let thread_id = handle.thread().id();
            pool.workers.lock().push(Worker {
                id,
                thread_id,
                handle,
            });
        }

        info!(threads = thread_count, ?poll_interval, "worker pool started");
        Ok(pool)
    }

    /// Append a job to the shared list.
    pub fn schedule<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        // Checked under the lock: `deinit` clears the list under the same
        // lock after raising the flag, so an accepted job is always either
        // run or discarded.
        let mut jobs = self.shared.jobs.lock();
        if self.shared.shutdown.load(Ordering::Acquire) {
            debug!("worker pool shut down; discarding scheduled job");
            return Err(DagpoolError::ExecutorShutdown);
        }
        jobs.push_back(Box::new(job));
        self.shared.job_available.notify_one();
        Ok(())
    }

    /// Block until the shared job list is observed empty.
    ///
    /// This is best-effort: jobs a worker has already popped may still be
    /// running when `wait` returns. Returns early if the pool shuts down.
    pub fn wait(&self) {
        let mut jobs = self.shared.jobs.lock();
        while !jobs.is_empty() && !self.shared.shutdown.load(Ordering::Acquire) {
            self.shared
                .drained
                .wait_for(&mut jobs, self.shared.poll_interval);
        }
    }

    /// Stop all workers, join them and discard jobs that never ran.
    ///
    /// Jobs already running finish first. When called from one of the
    /// pool's own threads, that thread is left detached instead of joined.
    pub fn deinit(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        let discarded = {
            let mut jobs = self.shared.jobs.lock();
            let n = jobs.len();
            jobs.clear();
            n
        };
        self.shared.job_available.notify_all();
        self.shared.drained.notify_all();

        let current = thread::current().id();
        let workers: Vec<Worker> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.thread_id == current {
                debug!(worker = worker.id, "deinit called from a pool thread; not joining self");
                continue;
            }
            if worker.handle.join().is_err() {
                error!(worker = worker.id, "worker thread panicked");
            }
        }

        info!(discarded, "worker pool stopped");
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Jobs waiting in the shared list.
    pub fn pending_jobs(&self) -> usize {
        self.shared.jobs.lock().len()
    }

    /// Jobs currently being run by a worker.
    pub fn active_jobs(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Whether the calling thread is one of this pool's workers.
    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.workers.lock().iter().any(|w| w.thread_id == current)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.deinit();
    }
}

fn worker_loop(id: usize, shared: Arc<PoolShared>) {
    debug!(worker = id, "worker started");

    while let Some(job) = shared.next_job() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(worker = id, "job panicked; worker continues");
        }
        shared.active.fetch_sub(1, Ordering::AcqRel);
    }

    debug!(worker = id, "worker exiting");
}
