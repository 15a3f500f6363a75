// tests/executor_scenarios.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use dagpool::channel::BoundedChannel;
use dagpool::config::ExecutorConfig;
use dagpool::errors::DagpoolError;
use dagpool::executor::{Executor, TaskId, TaskOptions, TaskStatus};
use dagpool_test_utils::builders::executor_config;
use dagpool_test_utils::recorder::Recorder;
use dagpool_test_utils::{eventually, init_tracing, with_timeout};

const LIMIT: Duration = Duration::from_secs(5);

/// A task that blocks its worker until `release` is called.
struct Gate {
    chan: Arc<BoundedChannel<()>>,
}

impl Gate {
    fn new() -> Self {
        Self {
            chan: Arc::new(BoundedChannel::new(1)),
        }
    }

    fn work(&self) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
        let chan = Arc::clone(&self.chan);
        move || -> anyhow::Result<()> {
            chan.receive()?;
            Ok(())
        }
    }

    fn release(&self) {
        self.chan.send(()).unwrap();
    }
}

fn wait_until_running(exec: &Executor, id: TaskId) {
    assert!(
        eventually(LIMIT, || exec.status(id).unwrap() == TaskStatus::Running),
        "task {id} never started"
    );
}

#[test]
fn test_single_task_increments_counter() {
    init_tracing();

    let exec = Executor::with_workers(4).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&counter);
    let t1 = exec
        .submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    exec.wait_for_task(t1).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(exec.status(t1).unwrap(), TaskStatus::Completed);
    assert_eq!(exec.worker_count(), 4);
}

#[test]
fn test_dependent_observes_dependency_effects() {
    init_tracing();

    let exec = Executor::with_workers(4).unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let seen = Arc::new(AtomicBool::new(false));

    let f = Arc::clone(&flag);
    let t1 = exec
        .submit(move || {
            thread::sleep(Duration::from_millis(20));
            f.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let (f, s) = (Arc::clone(&flag), Arc::clone(&seen));
    let t2 = exec
        .submit_after(
            move || {
                s.store(f.load(Ordering::SeqCst), Ordering::SeqCst);
                Ok(())
            },
            &[t1],
        )
        .unwrap();

    exec.wait_for_task(t2).unwrap();
    assert!(seen.load(Ordering::SeqCst));
    assert_eq!(exec.task_info(t2).unwrap().deps, vec![t1]);
}

#[test]
fn test_submit_after_shutdown_is_refused() {
    init_tracing();

    let exec = Executor::with_workers(2).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    exec.shutdown();
    assert!(exec.is_shutdown());

    let c = Arc::clone(&counter);
    let res = exec.submit(move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert!(matches!(res, Err(DagpoolError::ExecutorShutdown)));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(exec.stats().submitted, 0);

    // Idempotent.
    exec.shutdown();
}

#[test]
fn test_thousand_independent_tasks_each_run_once() {
    init_tracing();

    let exec = Executor::with_workers(8).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..1000).map(|_| AtomicUsize::new(0)).collect());

    for i in 0..1000 {
        let (c, r) = (Arc::clone(&counter), Arc::clone(&runs));
        exec.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
            r[i].fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    }

    exec.wait_for_all().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1000);
    assert!(runs.iter().all(|r| r.load(Ordering::SeqCst) == 1));

    let stats = exec.stats();
    assert_eq!(stats.submitted, 1000);
    assert_eq!(stats.completed, 1000);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.unfinished(), 0);
}

#[test]
fn test_failure_surfaces_cause_to_waiter() {
    init_tracing();

    let exec = Executor::with_workers(2).unwrap();
    let t = exec
        .submit(|| Err(anyhow::anyhow!("disk on fire")))
        .unwrap();

    let err = exec.wait_for_task(t).unwrap_err();
    match &err {
        DagpoolError::TaskFailed { task, cause } => {
            assert_eq!(*task, t);
            assert!(cause.message().contains("disk on fire"));
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert!(err.task_failure().is_some());

    // A second waiter sees the same stored cause.
    let again = exec.wait_for_task(t).unwrap_err();
    assert_eq!(
        again.task_failure().map(|c| c.to_string()),
        err.task_failure().map(|c| c.to_string())
    );
}

#[test]
fn test_panicking_task_fails_without_killing_worker() {
    init_tracing();

    let exec = Executor::with_workers(1).unwrap();
    let bad = exec.submit(|| panic!("kaboom")).unwrap();
    let good = exec.submit(|| Ok(())).unwrap();

    let err = exec.wait_for_task(bad).unwrap_err();
    let cause = err.task_failure().unwrap().to_string();
    assert!(cause.contains("panicked"), "cause was {cause}");
    assert!(cause.contains("kaboom"), "cause was {cause}");

    exec.wait_for_task(good).unwrap();
}

#[test]
fn test_failure_fails_dependents_without_running_them() {
    init_tracing();

    let exec = Executor::with_workers(4).unwrap();
    let rec = Recorder::new();

    let a = exec.submit(rec.failing_work(1)).unwrap();
    let b = exec.submit_after(rec.work(2), &[a]).unwrap();
    let c = exec.submit_after(rec.work(3), &[b]).unwrap();
    let d = exec.submit(rec.work(4)).unwrap();

    exec.wait_for_all().unwrap();

    assert_eq!(exec.status(a).unwrap(), TaskStatus::Failed);
    assert_eq!(exec.status(b).unwrap(), TaskStatus::Failed);
    assert_eq!(exec.status(c).unwrap(), TaskStatus::Failed);
    assert_eq!(exec.status(d).unwrap(), TaskStatus::Completed);

    assert!(rec.ran(1));
    assert!(!rec.ran(2));
    assert!(!rec.ran(3));
    assert!(rec.ran(4));

    let info_c = exec.task_info(c).unwrap();
    let cause = info_c.failure.as_ref().unwrap().to_string();
    assert!(cause.contains(&format!("dependency {b} failed")), "cause was {cause}");
    assert!(info_c.started_at.is_none());
    assert!(info_c.duration().is_none());

    // A task submitted after its dependency failed is failed immediately.
    let e = exec.submit_after(rec.work(5), &[c]).unwrap();
    assert_eq!(exec.status(e).unwrap(), TaskStatus::Failed);
    assert!(matches!(
        exec.wait_for_task(e),
        Err(DagpoolError::TaskFailed { .. })
    ));

    let stats = exec.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 4);
}

#[test]
fn test_lowest_ready_id_is_picked_first() {
    init_tracing();

    let exec = Executor::with_workers(1).unwrap();
    let rec = Recorder::new();
    let gate = Gate::new();

    let g = exec.submit(gate.work()).unwrap();
    wait_until_running(&exec, g);

    // The only worker is parked in the gate, so these all stay Ready.
    let a = exec.submit(rec.work(1)).unwrap();
    let b = exec.submit(rec.work(2)).unwrap();
    let _c = exec.submit(rec.work(3)).unwrap();
    exec.add_dependency(a, b).unwrap();

    gate.release();
    exec.wait_for_all().unwrap();

    // a (lowest id) waits for b; once b completes, a beats c.
    assert_eq!(rec.start_order(), vec![2, 1, 3]);
    assert!(rec.finished_before_started(2, 1));
}

#[test]
fn test_late_dependency_is_rejected() {
    init_tracing();

    let exec = Executor::with_workers(2).unwrap();
    let gate = Gate::new();

    let other = exec.submit(|| Ok(())).unwrap();
    exec.wait_for_task(other).unwrap();

    // Completed task.
    match exec.add_dependency(other, other) {
        Err(DagpoolError::LateDependency { task, status }) => {
            assert_eq!(task, other);
            assert_eq!(status, TaskStatus::Completed);
        }
        res => panic!("expected LateDependency, got {res:?}"),
    }

    // Running task.
    let running = exec.submit(gate.work()).unwrap();
    wait_until_running(&exec, running);
    assert!(matches!(
        exec.add_dependency(running, other),
        Err(DagpoolError::LateDependency {
            status: TaskStatus::Running,
            ..
        })
    ));

    gate.release();
    exec.wait_for_task(running).unwrap();
}

#[test]
fn test_cycle_is_rejected_when_detection_enabled() {
    init_tracing();

    let exec = Executor::with_workers(1).unwrap();
    let gate = Gate::new();

    let g = exec.submit(gate.work()).unwrap();
    let a = exec.submit_after(|| Ok(()), &[g]).unwrap();
    let b = exec.submit_after(|| Ok(()), &[a]).unwrap();

    assert!(matches!(
        exec.add_dependency(a, b),
        Err(DagpoolError::DependencyCycle { task, depends_on }) if task == a && depends_on == b
    ));
    assert!(matches!(
        exec.add_dependency(b, b),
        Err(DagpoolError::DependencyCycle { .. })
    ));

    // Adding an existing edge again is harmless.
    exec.add_dependency(b, a).unwrap();
    assert_eq!(exec.task_info(b).unwrap().deps, vec![a]);

    // Repeated ids at submission collapse the same way.
    let c = exec.submit_after(|| Ok(()), &[a, b, a]).unwrap();
    assert_eq!(exec.task_info(c).unwrap().deps, vec![a, b]);

    gate.release();
    with_timeout(move || exec.wait_for_all()).unwrap();
}

#[test]
fn test_cyclic_graph_never_completes_without_detection() {
    init_tracing();

    let exec = Arc::new(
        Executor::new(ExecutorConfig {
            detect_cycles: false,
            ..executor_config(2)
        })
        .unwrap(),
    );
    let rec = Recorder::new();
    let gate = Gate::new();

    let g = exec.submit(gate.work()).unwrap();
    let a = exec.submit_after(rec.work(1), &[g]).unwrap();
    let b = exec.submit_after(rec.work(2), &[g]).unwrap();
    exec.add_dependency(a, b).unwrap();
    exec.add_dependency(b, a).unwrap();
    gate.release();
    exec.wait_for_task(g).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let e = Arc::clone(&exec);
    thread::spawn(move || {
        let _ = done_tx.send(e.wait_for_all());
    });

    assert!(
        done_rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "wait_for_all returned on a cyclic graph"
    );
    assert!(!rec.ran(1));
    assert!(!rec.ran(2));
    assert_eq!(exec.status(a).unwrap(), TaskStatus::Ready);

    // Shutdown is what finally releases the waiter.
    exec.shutdown();
    let res = done_rx.recv_timeout(LIMIT).unwrap();
    assert!(matches!(res, Err(DagpoolError::ExecutorShutdown)));
}

#[test]
fn test_shutdown_leaves_ready_tasks_unstarted_and_wakes_waiters() {
    init_tracing();

    let exec = Arc::new(Executor::with_workers(1).unwrap());
    let rec = Recorder::new();
    let gate = Gate::new();

    let g = exec.submit(gate.work()).unwrap();
    wait_until_running(&exec, g);
    let pending = exec.submit(rec.work(1)).unwrap();

    let (wait_tx, wait_rx) = mpsc::channel();
    let e = Arc::clone(&exec);
    thread::spawn(move || {
        let _ = wait_tx.send(e.wait_for_task(pending));
    });

    // shutdown joins the worker, which is still inside the gate.
    let e = Arc::clone(&exec);
    let shutdown = thread::spawn(move || e.shutdown());
    assert!(eventually(LIMIT, || exec.is_shutdown()));

    let res = wait_rx.recv_timeout(LIMIT).unwrap();
    assert!(matches!(res, Err(DagpoolError::ExecutorShutdown)));

    // The in-flight task still finishes.
    gate.release();
    shutdown.join().unwrap();

    assert_eq!(exec.status(g).unwrap(), TaskStatus::Completed);
    exec.wait_for_task(g).unwrap();
    assert_eq!(exec.status(pending).unwrap(), TaskStatus::Ready);
    assert!(!rec.ran(1));
}

#[test]
fn test_single_shutdown_releases_every_blocked_waiter() {
    init_tracing();

    let exec = Arc::new(Executor::with_workers(1).unwrap());
    let gate = Gate::new();

    let g = exec.submit(gate.work()).unwrap();
    wait_until_running(&exec, g);
    let t1 = exec.submit(|| Ok(())).unwrap();
    let t2 = exec.submit_after(|| Ok(()), &[t1]).unwrap();

    let (res_tx, res_rx) = mpsc::channel();
    let targets = [Some(t1), Some(t1), Some(t2), None, None];
    for target in targets {
        let (e, tx) = (Arc::clone(&exec), res_tx.clone());
        thread::spawn(move || {
            let res = match target {
                Some(id) => e.wait_for_task(id),
                None => e.wait_for_all(),
            };
            let _ = tx.send(res);
        });
    }
    drop(res_tx);

    assert!(
        res_rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "a waiter returned before shutdown"
    );

    let e = Arc::clone(&exec);
    let shutdown = thread::spawn(move || e.shutdown());

    for _ in 0..targets.len() {
        let res = res_rx.recv_timeout(LIMIT).expect("waiter still blocked after shutdown");
        assert!(matches!(res, Err(DagpoolError::ExecutorShutdown)));
    }

    gate.release();
    shutdown.join().unwrap();
}

#[test]
fn test_completion_callback_runs_on_worker_before_waiters_wake() {
    init_tracing();

    let exec = Executor::with_workers(2).unwrap();
    let called_with = Arc::new(AtomicUsize::new(0));
    let on_worker = Arc::new(AtomicBool::new(false));

    let (c, w) = (Arc::clone(&called_with), Arc::clone(&on_worker));
    let t = exec
        .submit_with(
            || Ok(()),
            TaskOptions::new().label("with-callback").on_complete(move |id| {
                c.store(id.as_u64() as usize, Ordering::SeqCst);
                let name = thread::current().name().unwrap_or_default().to_string();
                w.store(name.starts_with("dagpool-worker-"), Ordering::SeqCst);
            }),
        )
        .unwrap();

    exec.wait_for_task(t).unwrap();
    assert_eq!(called_with.load(Ordering::SeqCst), t.as_u64() as usize);
    assert!(on_worker.load(Ordering::SeqCst));

    let info = exec.task_info(t).unwrap();
    assert_eq!(info.label.as_deref(), Some("with-callback"));
    assert!(info.duration().is_some());
}

#[test]
fn test_callback_not_called_on_failure_and_panic_fails_task() {
    init_tracing();

    let exec = Executor::with_workers(2).unwrap();
    let called = Arc::new(AtomicBool::new(false));

    let c = Arc::clone(&called);
    let failed = exec
        .submit_with(
            || anyhow::bail!("nope"),
            TaskOptions::new().on_complete(move |_| c.store(true, Ordering::SeqCst)),
        )
        .unwrap();
    assert!(exec.wait_for_task(failed).is_err());
    assert!(!called.load(Ordering::SeqCst));

    let bad_callback = exec
        .submit_with(
            || Ok(()),
            TaskOptions::new().on_complete(|_| panic!("callback blew up")),
        )
        .unwrap();
    let err = exec.wait_for_task(bad_callback).unwrap_err();
    assert!(err.to_string().contains("completion callback failed"));
}

#[test]
fn test_tasks_can_submit_more_tasks() {
    init_tracing();

    let exec = Arc::new(Executor::with_workers(4).unwrap());
    let counter = Arc::new(AtomicUsize::new(0));

    let (e, c) = (Arc::clone(&exec), Arc::clone(&counter));
    let parent = exec
        .submit(move || {
            for _ in 0..10 {
                let c = Arc::clone(&c);
                e.submit(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })?;
            }
            Ok(())
        })
        .unwrap();

    exec.wait_for_task(parent).unwrap();
    exec.wait_for_all().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn test_unknown_handles_are_reported() {
    let small = Executor::with_workers(1).unwrap();
    let big = Executor::with_workers(1).unwrap();

    small.submit(|| Ok(())).unwrap();
    let foreign = (0..3).map(|_| big.submit(|| Ok(())).unwrap()).last().unwrap();

    assert!(matches!(small.status(foreign), Err(DagpoolError::UnknownTask(id)) if id == foreign));
    assert!(matches!(
        small.wait_for_task(foreign),
        Err(DagpoolError::UnknownTask(_))
    ));
    assert!(matches!(
        small.submit_after(|| Ok(()), &[foreign]),
        Err(DagpoolError::UnknownTask(_))
    ));
    // The rejected submission did not consume an id or count as submitted.
    assert_eq!(small.stats().submitted, 1);
}

#[test]
fn test_wait_for_all_on_empty_executor_returns() {
    let exec = Executor::with_workers(1).unwrap();
    exec.wait_for_all().unwrap();
}

#[test]
fn test_invalid_config_is_rejected() {
    assert!(matches!(
        Executor::with_workers(0),
        Err(DagpoolError::ConfigError(_))
    ));
    assert!(matches!(
        Executor::new(ExecutorConfig {
            poll_interval_ms: 0,
            ..executor_config(1)
        }),
        Err(DagpoolError::ConfigError(_))
    ));
}
