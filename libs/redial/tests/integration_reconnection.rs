//! Integration tests for reconnection strategies and the retry scheduler
//!
//! These tests verify backoff sequences and retry bookkeeping against a
//! manual clock.

mod common;

use redial::traits::reconnect::{
    ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy,
};
use redial::{ManualTimer, RetryDecision, RetryScheduler, SchedulerState, TickAction, TickKind};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_millis(3000);

fn scheduler(strategy: impl ReconnectionStrategy + 'static) -> (RetryScheduler, ManualTimer) {
    let timer = ManualTimer::new();
    (
        RetryScheduler::new(Box::new(strategy), Box::new(timer.clone())),
        timer,
    )
}

#[test]
fn test_exponential_backoff_full_sequence() {
    verbose_println!("Testing exponential backoff full sequence...");

    let strategy = ExponentialBackoff::new(
        Duration::from_millis(100),
        Duration::from_secs(10),
        Some(5),
    );

    let expected_delays = [100, 200, 400, 800, 1600];

    for (retry, &expected_ms) in expected_delays.iter().enumerate() {
        let delay = strategy.next_delay(retry).unwrap();
        verbose_println!("  Retry {}: {:?}", retry, delay);
        assert_eq!(
            delay.as_millis(),
            expected_ms,
            "Unexpected delay at retry {}",
            retry
        );
    }

    assert!(
        strategy.next_delay(5).is_none(),
        "Should return None after max retries"
    );
}

#[test]
fn test_exponential_backoff_with_capping() {
    verbose_println!("Testing exponential backoff with capping...");

    let strategy = ExponentialBackoff::forever(Duration::from_millis(500), Duration::from_secs(2));

    let delays: Vec<u64> = (0..6)
        .map(|i| strategy.next_delay(i).unwrap().as_millis() as u64)
        .collect();

    verbose_println!("  Delays: {:?}", delays);
    assert_eq!(delays, vec![500, 1000, 2000, 2000, 2000, 2000]);
}

#[test]
fn test_exponential_backoff_huge_retry_index_saturates() {
    let strategy = ExponentialBackoff::forever(Duration::from_millis(2000), Duration::from_secs(30));
    assert_eq!(strategy.next_delay(63), Some(Duration::from_secs(30)));
    assert_eq!(strategy.next_delay(10_000), Some(Duration::from_secs(30)));
}

#[test]
fn test_fixed_delay_consistency() {
    verbose_println!("Testing fixed delay consistency...");

    let strategy = FixedDelay::new(Duration::from_millis(250), Some(3));
    for retry in 0..3 {
        assert_eq!(strategy.next_delay(retry), Some(Duration::from_millis(250)));
    }
    assert!(strategy.next_delay(3).is_none());
    assert!(!strategy.should_reconnect(3));
}

#[test]
fn test_never_reconnect() {
    let strategy = NeverReconnect;
    assert!(strategy.next_delay(0).is_none());
    assert!(!strategy.should_reconnect(0));
}

#[test]
fn test_scheduler_with_fixed_delay_abandons_after_budget() {
    verbose_println!("Testing scheduler with fixed delay...");

    let (mut s, timer) = scheduler(FixedDelay::new(Duration::from_millis(50), Some(2)));
    assert_eq!(s.attempt(TIMEOUT), 1);

    assert_eq!(
        s.retry("refused"),
        RetryDecision::Scheduled {
            attempt: 2,
            delay: Duration::from_millis(50)
        }
    );
    let tick = timer.fire_next().unwrap();
    assert_eq!(tick.kind, TickKind::Backoff);
    assert_eq!(s.on_tick(tick), Some(TickAction::Connect(2)));

    assert!(s.retry("refused").will_retry());
    assert_eq!(s.retry("refused"), RetryDecision::Abandoned);
    assert_eq!(s.state(), SchedulerState::Abandoned);
    assert!(timer.pending().is_empty());
}

#[test]
fn test_scheduler_never_reconnect_abandons_immediately() {
    let (mut s, timer) = scheduler(NeverReconnect);
    s.attempt(TIMEOUT);
    assert_eq!(s.retry("refused"), RetryDecision::Abandoned);
    assert!(timer.pending().is_empty());
}

#[test]
fn test_scheduler_zero_timeout_arms_nothing() {
    let (mut s, timer) = scheduler(ExponentialBackoff::forever(
        Duration::from_millis(100),
        Duration::from_secs(1),
    ));
    s.attempt(Duration::ZERO);
    assert!(timer.pending().is_empty());

    s.retry("down");
    let tick = timer.fire_next().unwrap();
    assert_eq!(s.on_tick(tick), Some(TickAction::Connect(2)));
    assert!(timer.pending().is_empty());
}

#[test]
fn test_scheduler_stop_then_reset_allows_new_cycle() {
    verbose_println!("Testing stop/reset cycle...");

    let (mut s, _timer) = scheduler(ExponentialBackoff::forever(
        Duration::from_millis(100),
        Duration::from_secs(1),
    ));

    for cycle in 0..3 {
        verbose_println!("  Cycle {}", cycle);
        s.attempt(TIMEOUT);
        s.retry("down");
        s.retry("down");
        assert_eq!(s.attempts(), 3);
        s.stop();
        assert_eq!(s.retry("late"), RetryDecision::Ignored);
        s.reset();
        assert_eq!(s.attempts(), 0);
    }
}
