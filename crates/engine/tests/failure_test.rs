//! Integration tests for unit failures, panics and shutdown while waiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use batchflow_engine::{from_fn, BatchState, EngineError, TaskSystem, WorkError};

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn failing_unit_fails_its_batch() {
    let engine = TaskSystem::new(2).unwrap();
    let err = engine
        .run_sync(
            from_fn(|i, _| {
                if i == 3 { Err(WorkError::failed("bad pixel")) } else { Ok(()) }
            }),
            8,
        )
        .unwrap_err();

    match err {
        EngineError::BatchFailed { batch, reason } => {
            assert_eq!(batch, 0);
            assert_eq!(reason, "bad pixel");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.status(0).unwrap().state, BatchState::Failed);
}

#[test]
fn dependents_of_failed_batch_never_start() {
    let engine = TaskSystem::new(2).unwrap();
    let dependent_runs = Arc::new(AtomicUsize::new(0));

    let a = engine
        .submit_async(from_fn(|_, _| Err(WorkError::failed("upstream broke"))), 2, &[])
        .unwrap();
    let runs = Arc::clone(&dependent_runs);
    let b = engine
        .submit_async(
            from_fn(move |_, _| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            4,
            &[a],
        )
        .unwrap();
    let runs = Arc::clone(&dependent_runs);
    let c = engine
        .submit_async(
            from_fn(move |_, _| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            4,
            &[b],
        )
        .unwrap();

    let err = engine.wait(c).unwrap_err();
    assert!(matches!(err, EngineError::BatchFailed { batch, .. } if batch == c));
    assert_eq!(dependent_runs.load(Ordering::SeqCst), 0);

    let status = engine.status(b).unwrap();
    assert_eq!(status.failure.as_deref(), Some("dependency 0 failed"));
}

#[test]
fn barrier_reports_first_failure_once() {
    let engine = TaskSystem::new(1).unwrap();
    engine.submit_async(from_fn(|_, _| Ok(())), 3, &[]).unwrap();
    let broken = engine
        .submit_async(from_fn(|_, _| Err(WorkError::failed("nope"))), 1, &[])
        .unwrap();

    match engine.barrier() {
        Err(EngineError::BatchFailed { batch, .. }) => assert_eq!(batch, broken),
        other => panic!("expected failure, got {other:?}"),
    }
    // Already reported; the engine keeps working.
    engine.barrier().unwrap();
    engine.run_sync(from_fn(|_, _| Ok(())), 5).unwrap();
}

#[test]
fn panicking_unit_does_not_kill_the_worker() {
    let engine = TaskSystem::new(1).unwrap();
    let err = engine
        .run_sync(from_fn(|_, _| panic!("kernel exploded")), 1)
        .unwrap_err();
    assert!(err.to_string().contains("kernel exploded"), "{err}");

    // The single worker is still alive.
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    engine
        .run_sync(
            from_fn(move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            10,
        )
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 10);
}

#[test]
fn shutdown_cancels_pending_barrier() {
    let engine = Arc::new(TaskSystem::new(1).unwrap());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);

    let gate = engine
        .submit_async(
            from_fn(move |_, _| {
                started_tx.send(()).ok();
                release_rx.lock().unwrap().recv().ok();
                Ok(())
            }),
            1,
            &[],
        )
        .unwrap();
    let dependent_runs = Arc::new(AtomicUsize::new(0));
    let runs = Arc::clone(&dependent_runs);
    let dependent = engine
        .submit_async(
            from_fn(move |_, _| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            4,
            &[gate],
        )
        .unwrap();
    started_rx.recv_timeout(TIMEOUT).unwrap();

    let (result_tx, result_rx) = mpsc::channel();
    let waiter = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || result_tx.send(engine.barrier()).ok())
    };
    // The barrier is blocked on the gate.
    assert!(result_rx.recv_timeout(Duration::from_millis(100)).is_err());

    let stopper = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.shutdown())
    };
    let result = result_rx.recv_timeout(TIMEOUT).unwrap();
    assert!(matches!(result, Err(EngineError::Cancelled)));

    release_tx.send(()).unwrap();
    stopper.join().unwrap();
    waiter.join().unwrap();

    // The gate finished after shutdown; its dependent was abandoned.
    assert_eq!(engine.status(gate).unwrap().state, BatchState::Done);
    assert_eq!(dependent_runs.load(Ordering::SeqCst), 0);
    assert_eq!(engine.status(dependent).unwrap().state, BatchState::Pending);
    assert!(engine.wait(dependent).unwrap_err().is_cancelled());
}

#[test]
fn barrier_leaves_later_failures_for_the_next_barrier() {
    let engine = Arc::new(TaskSystem::new(2).unwrap());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);

    engine
        .submit_async(
            from_fn(move |_, _| {
                started_tx.send(()).ok();
                release_rx.lock().unwrap().recv().ok();
                Ok(())
            }),
            1,
            &[],
        )
        .unwrap();
    started_rx.recv_timeout(TIMEOUT).unwrap();

    let (result_tx, result_rx) = mpsc::channel();
    let waiter = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || result_tx.send(engine.barrier()).ok())
    };
    assert!(result_rx.recv_timeout(Duration::from_millis(100)).is_err());

    // Submitted after the first barrier started waiting.
    let late = engine
        .submit_async(from_fn(|_, _| Err(WorkError::failed("late"))), 1, &[])
        .unwrap();
    assert!(engine.wait(late).is_err());

    release_tx.send(()).unwrap();
    assert!(result_rx.recv_timeout(TIMEOUT).unwrap().is_ok());
    waiter.join().unwrap();

    match engine.barrier() {
        Err(EngineError::BatchFailed { batch, reason }) => {
            assert_eq!(batch, late);
            assert_eq!(reason, "late");
        }
        other => panic!("expected the late failure, got {other:?}"),
    }
}

#[test]
fn wait_after_shutdown_reports_settled_outcome() {
    let engine = TaskSystem::new(2).unwrap();
    let done = engine.submit_async(from_fn(|_, _| Ok(())), 2, &[]).unwrap();
    engine.wait(done).unwrap();
    engine.shutdown();

    // Settled batches keep their outcome after shutdown.
    engine.wait(done).unwrap();
    engine.barrier().unwrap();
}
