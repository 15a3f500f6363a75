// src/executor/worker.rs

//! The long-running job each pool thread executes on behalf of the
//! executor.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use crate::executor::Shared;
use crate::executor::graph::ClaimedTask;
use crate::executor::task::TaskFailure;

/// Claim ready tasks and run them until the executor shuts down.
///
/// A worker never holds the table lock while user code runs: neither the
/// task's work nor its completion callback.
pub(crate) fn run_worker(worker: usize, shared: Arc<Shared>) {
    debug!(worker, "executor worker started");

    while let Some(task) = next_task(&shared) {
        execute(worker, &shared, task);
    }

    debug!(worker, "executor worker stopping (shutdown)");
}

/// Block until a task is runnable or shutdown is requested.
fn next_task(shared: &Shared) -> Option<ClaimedTask> {
    let mut graph = shared.graph.lock();
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            return None;
        }
        if let Some(task) = graph.claim_next_ready() {
            return Some(task);
        }
        // Woken on submit/completion; the timeout is only a safety net.
        shared.work_ready.wait_for(&mut graph, shared.poll_interval);
    }
}

fn execute(worker: usize, shared: &Shared, task: ClaimedTask) {
    let ClaimedTask {
        id,
        work,
        on_complete,
        label,
    } = task;

    debug!(worker, task = %id, label = label.as_deref(), "running task");

    let mut outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TaskFailure::from_error(&err)),
        Err(payload) => Err(TaskFailure::from_panic(&*payload)),
    };

    if outcome.is_ok() {
        if let Some(callback) = on_complete {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || callback(id))) {
                let cause = TaskFailure::from_panic(&*payload);
                outcome = Err(TaskFailure::from_message(format!(
                    "completion callback failed: {cause}"
                )));
            }
        }
    }

    match &outcome {
        Ok(()) => info!(worker, task = %id, label = label.as_deref(), "task completed"),
        Err(cause) => warn!(
            worker,
            task = %id,
            label = label.as_deref(),
            error = %cause,
            "task failed"
        ),
    }

    let newly_failed = {
        let mut graph = shared.graph.lock();
        let newly_failed = graph.finish(id, outcome);
        shared.settled.notify_all();
        shared.work_ready.notify_all();
        newly_failed
    };

    if !newly_failed.is_empty() {
        warn!(task = %id, dependents = ?newly_failed, "dependents failed without running");
    }
}
