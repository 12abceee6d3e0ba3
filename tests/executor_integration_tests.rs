//! Integration tests for the Executor against a live loop thread
//!
//! These tests verify that the Executor correctly:
//! - Submits tasks from worker threads onto the bound loop thread
//! - Blocks shutdown(wait) on one thread while the loop thread drains
//! - Cancels not-yet-dispatched tasks at shutdown without running them
//! - Survives scoped release (Drop performs a waiting shutdown)

mod common;

use common::LoopThread;
use crossloop::{Executor, FutureError, Registry, ShutdownOptions, SubmitError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn test_submit_from_worker_runs_on_loop_thread() {
    let registry = Registry::new();
    let loop_thread = LoopThread::spawn(registry.clone());
    let executor = Executor::with_registry(&registry).unwrap();
    assert_eq!(executor.target_thread(), loop_thread.thread_id());

    let ran_on = Arc::new(Mutex::new(None));
    let ran_on_clone = Arc::clone(&ran_on);
    let future = executor
        .submit(move || {
            *ran_on_clone.lock().unwrap() = Some(thread::current().id());
            11
        })
        .unwrap();

    assert!(loop_thread.pump_until(|| future.done()));
    assert_eq!(future.result(None).unwrap(), 11);
    assert_eq!(*ran_on.lock().unwrap(), Some(loop_thread.thread_id()));

    executor.shutdown();
}

#[test]
fn test_shutdown_waits_for_task_to_finish() {
    let registry = Registry::new();
    let loop_thread = LoopThread::spawn(registry.clone());

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = Arc::clone(&ran);
    let shut_down = Arc::new(AtomicBool::new(false));
    let shut_down_clone = Arc::clone(&shut_down);

    let registry_clone = registry.clone();
    let worker = thread::spawn(move || {
        let executor = Executor::with_registry(&registry_clone).unwrap();
        executor
            .submit(move || ran_clone.store(true, Ordering::SeqCst))
            .unwrap();
        // Blocks until the loop thread runs the task.
        executor.shutdown();
        shut_down_clone.store(true, Ordering::SeqCst);
    });

    assert!(loop_thread.pump_until(|| shut_down.load(Ordering::SeqCst)));
    worker.join().unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn test_shutdown_can_cancel_futures() {
    let registry = Registry::new();
    let loop_thread = LoopThread::spawn(registry.clone());

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = Arc::clone(&ran);

    let registry_clone = registry.clone();
    let worker = thread::spawn(move || {
        let executor = Executor::with_registry(&registry_clone).unwrap();
        let future = executor
            .submit(move || ran_clone.store(true, Ordering::SeqCst))
            .unwrap();
        executor
            .shutdown_with(ShutdownOptions {
                wait: true,
                cancel_futures: true,
                timeout: None,
            })
            .unwrap();
        future
    });
    let future = worker.join().unwrap();

    // Drain the loop: the cancelled task's dispatch is a no-op.
    loop_thread.pump();
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(future.result(None), Err(FutureError::Cancelled));
}

#[test]
fn test_shutdown_does_not_have_to_wait() {
    let registry = Registry::new();
    let loop_thread = LoopThread::spawn(registry.clone());

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = Arc::clone(&ran);

    let registry_clone = registry.clone();
    let worker = thread::spawn(move || {
        let executor = Executor::with_registry(&registry_clone).unwrap();
        executor
            .submit(move || ran_clone.store(true, Ordering::SeqCst))
            .unwrap();
        executor.shutdown_with(ShutdownOptions {
            wait: false,
            cancel_futures: false,
            timeout: None,
        })
    });
    // Returns without the loop having pumped at all.
    worker.join().unwrap().unwrap();
    assert!(!ran.load(Ordering::SeqCst));

    // The task still completes asynchronously.
    assert!(loop_thread.pump_until(|| ran.load(Ordering::SeqCst)));
}

#[test]
fn test_scoped_release_waits_like_shutdown() {
    let registry = Registry::new();
    let loop_thread = LoopThread::spawn(registry.clone());

    let ran = Arc::new(AtomicBool::new(false));
    let ran_clone = Arc::clone(&ran);
    let released = Arc::new(AtomicBool::new(false));
    let released_clone = Arc::clone(&released);

    let registry_clone = registry.clone();
    let worker = thread::spawn(move || {
        {
            let executor = Executor::with_registry(&registry_clone).unwrap();
            executor
                .submit(move || ran_clone.store(true, Ordering::SeqCst))
                .unwrap();
            // Scope exit: Drop performs shutdown(wait = true).
        }
        released_clone.store(true, Ordering::SeqCst);
    });

    assert!(loop_thread.pump_until(|| released.load(Ordering::SeqCst)));
    worker.join().unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn test_submission_fails_after_shutdown() {
    let registry = Registry::new();
    let _loop_thread = LoopThread::spawn(registry.clone());
    let executor = Executor::with_registry(&registry).unwrap();

    executor.shutdown();
    let result = executor.submit(|| 0);
    assert_eq!(result.err(), Some(SubmitError::ShutDown));
    assert_eq!(executor.outstanding(), 0);
}

#[test]
fn test_concurrent_submissions_all_complete() {
    let registry = Registry::new();
    let loop_thread = LoopThread::spawn(registry.clone());
    let executor = Arc::new(Executor::with_registry(&registry).unwrap());

    let counter = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let executor = Arc::clone(&executor);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..10 {
                    let counter = Arc::clone(&counter);
                    executor
                        .submit(move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(loop_thread.pump_until(|| counter.load(Ordering::SeqCst) == 40));
    assert_eq!(executor.outstanding(), 0);
    assert_eq!(
        registry.metrics().tasks_submitted.load(Ordering::Relaxed),
        40
    );
    assert_eq!(
        registry.metrics().tasks_completed.load(Ordering::Relaxed),
        40
    );

    executor.shutdown();
}

#[test]
fn test_shutdown_timeout_from_worker_thread() {
    let registry = Registry::new();
    let loop_thread = LoopThread::spawn(registry.clone());
    let executor = Executor::with_registry(&registry).unwrap();

    executor.submit(|| 0).unwrap();

    // Nobody pumps the loop during the wait, so the bound expires.
    let result = executor.shutdown_with(ShutdownOptions {
        wait: true,
        cancel_futures: false,
        timeout: Some(Duration::from_millis(50)),
    });
    assert_eq!(
        result.err().unwrap().to_string(),
        "shutdown wait timed out after 50ms"
    );

    // Drain so the loop thread fixture can exit cleanly.
    loop_thread.pump();
    assert_eq!(executor.outstanding(), 0);
}

#[test]
fn test_fault_in_submitted_task_reaches_the_waiter() {
    let registry = Registry::new();
    let loop_thread = LoopThread::spawn(registry.clone());
    let executor = Executor::with_registry(&registry).unwrap();

    let future: crossloop::Future<i32> = executor.submit(|| panic!("worker fault")).unwrap();
    assert!(loop_thread.pump_until(|| future.done()));

    let fault = future.exception(None).unwrap().unwrap();
    assert_eq!(fault.message(), "worker fault");

    executor.shutdown();
}
