//! Dispatch Worker Integration Tests
//!
//! The engine must never be entered concurrently, calls must run in
//! submission order, and cancellation must never reach into the engine.

#[macro_use]
mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bfbridge::adapter::programs;
use bfbridge::{BridgeError, CancelToken};

#[test]
fn test_concurrent_callers_are_serialised() {
    counting_engine!(engine);
    let bridge = Arc::new(engine::bridge());

    const THREADS: u8 = 8;
    const CALLS_PER_THREAD: u8 = 50;

    let callers: Vec<_> = (0..THREADS)
        .map(|t| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                for i in 0..CALLS_PER_THREAD {
                    let sum = bridge.run(programs::ADD, &[t, i]).unwrap();
                    assert_eq!(sum, vec![t.wrapping_add(i)]);
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }
    bridge.shutdown();

    let total = THREADS as usize * CALLS_PER_THREAD as usize;
    assert_eq!(engine::calls(), total);
    assert_eq!(engine::max_in_flight(), 1);
    assert_eq!(engine::frees(), total);
    assert_eq!(engine::outstanding(), 0);
}

#[test]
fn test_calls_run_in_submission_order() {
    counting_engine!(engine);
    let bridge = engine::bridge();

    let pendings: Vec<_> = (1..=64u8)
        .map(|i| bridge.submit(programs::ADD, &[i, 0]).unwrap())
        .collect();
    let tickets: Vec<u64> = pendings.iter().map(|p| p.ticket()).collect();
    assert!(tickets.windows(2).all(|w| w[0] < w[1]));

    for (i, pending) in (1..=64u8).zip(pendings) {
        assert_eq!(pending.wait().unwrap().output(), &[i]);
    }
    assert_eq!(engine::order(), (1..=64u8).collect::<Vec<_>>());
}

#[test]
fn test_cancel_before_dispatch_never_enters_engine() {
    counting_engine!(engine);
    let bridge = engine::bridge();

    engine::hold();
    let running = bridge.submit(programs::ADD, &[1, 1]).unwrap();
    engine::wait_for_calls(1);

    let queued = bridge.submit(programs::ADD, &[2, 2]).unwrap();
    queued.cancel();
    engine::release();

    assert_eq!(running.wait().unwrap().output(), &[2]);
    bridge.shutdown();

    assert_eq!(engine::calls(), 1);
    assert_eq!(engine::order(), vec![1]);
    let stats = bridge.worker_stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn test_cancel_token_abandons_running_call() {
    counting_engine!(engine);
    let bridge = engine::bridge();
    let token = CancelToken::new();

    engine::hold();
    let trip = token.clone();
    let interrupter = thread::spawn(move || {
        engine::wait_for_calls(1);
        thread::sleep(Duration::from_millis(10));
        trip.cancel();
    });

    let err = bridge
        .execute_cancellable(programs::HELLO_WORLD, &[], &token)
        .unwrap_err();
    assert!(matches!(err, BridgeError::Cancelled));
    interrupter.join().unwrap();

    // The worker stays usable once the abandoned call returns
    engine::release();
    token.reset();
    let result = bridge
        .execute_cancellable(programs::ADD, &[5, 6], &token)
        .unwrap();
    assert_eq!(result.output(), &[11]);

    bridge.shutdown();
    assert_eq!(bridge.worker_stats().discarded, 1);
    assert_eq!(engine::outstanding(), 0);
}

#[test]
fn test_worker_counts_completed_calls() {
    counting_engine!(engine);
    let bridge = engine::bridge();
    bridge.run(programs::HELLO_WORLD, &[]).unwrap();
    bridge.shutdown();
    assert_eq!(bridge.worker_stats().completed, 1);
}
