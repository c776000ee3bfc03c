//! Output Ownership Integration Tests
//!
//! Every successful engine output is released exactly once with the pair
//! the engine returned. Failed calls release nothing.

#[macro_use]
mod common;

use std::time::Duration;

use bfbridge::adapter::programs;
use bfbridge::BridgeError;

#[test]
fn test_many_calls_leave_nothing_outstanding() {
    counting_engine!(engine);
    let bridge = engine::bridge();

    for i in 0..1000u32 {
        let a = (i % 256) as u8;
        let result = bridge.execute(programs::ADD, &[a, 7]).unwrap();
        assert_eq!(result.output(), &[a.wrapping_add(7)]);
    }
    bridge.shutdown();

    assert_eq!(engine::successes(), 1000);
    assert_eq!(engine::frees(), 1000);
    assert_eq!(engine::bad_frees(), 0);
    assert_eq!(engine::outstanding(), 0);
}

#[test]
fn test_large_outputs_are_released() {
    counting_engine!(engine);
    let bridge = engine::bridge();

    for _ in 0..20 {
        let output = bridge.run(programs::COUNTDOWN, &[]).unwrap();
        assert_eq!(output.len(), programs::COUNTDOWN_OUTPUT_LEN);
    }
    bridge.shutdown();

    assert_eq!(engine::frees(), 20);
    assert_eq!(engine::outstanding(), 0);
}

#[test]
fn test_failed_calls_are_never_released() {
    counting_engine!(engine);
    let bridge = engine::bridge();

    for _ in 0..100 {
        let result = bridge.execute_program(b"[[]").unwrap();
        assert!(!result.success());
    }
    bridge.shutdown();

    assert_eq!(engine::calls(), 100);
    assert_eq!(engine::successes(), 0);
    assert_eq!(engine::frees(), 0);
}

#[test]
fn test_mixed_outcomes() {
    counting_engine!(engine);
    let bridge = engine::bridge();

    for i in 0..200 {
        let program: &[u8] = if i % 3 == 0 { b"]" } else { programs::HELLO_WORLD };
        let result = bridge.execute_program(program).unwrap();
        assert_eq!(result.success(), i % 3 != 0);
    }
    bridge.shutdown();

    assert_eq!(engine::successes(), 133);
    assert_eq!(engine::frees(), 133);
    assert_eq!(engine::bad_frees(), 0);
    assert_eq!(engine::outstanding(), 0);
}

#[test]
fn test_empty_successful_output_is_released_once() {
    counting_engine!(engine);
    let bridge = engine::bridge();

    for _ in 0..10 {
        let result = bridge.execute(programs::ECHO, &[]).unwrap();
        assert!(result.success());
        assert!(result.output().is_empty());
    }
    bridge.shutdown();

    assert_eq!(engine::frees(), engine::successes());
    assert_eq!(engine::bad_frees(), 0);
    assert_eq!(engine::outstanding(), 0);
}

#[test]
fn test_abandoned_call_is_still_released() {
    counting_engine!(engine);
    let bridge = engine::bridge();

    engine::hold();
    let pending = bridge.submit(programs::COUNTDOWN, &[]).unwrap();
    engine::wait_for_calls(1);
    let err = pending.wait_timeout(Duration::from_millis(20)).unwrap_err();
    assert!(matches!(err, BridgeError::Cancelled));
    assert_eq!(engine::frees(), 0);

    engine::release();
    bridge.shutdown();

    assert_eq!(engine::successes(), 1);
    assert_eq!(engine::frees(), 1);
    assert_eq!(engine::outstanding(), 0);
    assert_eq!(bridge.worker_stats().discarded, 1);
}
