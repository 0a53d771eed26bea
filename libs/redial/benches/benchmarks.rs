//! Benchmarks for the redial library
//!
//! Run with: cargo bench -p redial

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::time::Duration;

use redial::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use redial::traits::reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
use redial::{
    Command, EventName, ManualTimer, Notification, Payload, RetryScheduler, TimestampFormat,
    WsMessage,
};
use serde_json::json;

/// Benchmark atomic state operations
fn bench_atomic_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomic_state");

    group.bench_function("get", |b| {
        let state = AtomicConnectionState::new(ConnectionState::Connected);
        b.iter(|| black_box(state.get()))
    });

    group.bench_function("set", |b| {
        let state = AtomicConnectionState::new(ConnectionState::Idle);
        b.iter(|| {
            state.set(black_box(ConnectionState::Connected));
        })
    });

    group.bench_function("metrics_increment", |b| {
        let metrics = AtomicMetrics::new();
        b.iter(|| {
            metrics.increment_sent();
            metrics.increment_received();
        })
    });

    group.finish();
}

/// Benchmark backoff computation
fn bench_reconnection_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconnection");

    group.bench_function("exponential_next_delay", |b| {
        let strategy = ExponentialBackoff::forever(Duration::from_millis(2000), Duration::from_secs(30));
        b.iter(|| {
            for retry in 0..16 {
                black_box(strategy.next_delay(black_box(retry)));
            }
        })
    });

    group.bench_function("fixed_next_delay", |b| {
        let strategy = FixedDelay::new(Duration::from_millis(500), Some(100));
        b.iter(|| black_box(strategy.next_delay(black_box(42))))
    });

    group.bench_function("scheduler_retry_cycle", |b| {
        let timer = ManualTimer::new();
        let strategy = ExponentialBackoff::forever(Duration::from_millis(100), Duration::from_secs(1));
        let mut scheduler = RetryScheduler::new(Box::new(strategy), Box::new(timer.clone()));
        b.iter(|| {
            scheduler.attempt(Duration::from_millis(3000));
            for _ in 0..8 {
                black_box(scheduler.retry("down"));
            }
            scheduler.stop();
            scheduler.reset();
        })
    });

    group.finish();
}

/// Benchmark notification building and serialization
fn bench_notifications(c: &mut Criterion) {
    let mut group = c.benchmark_group("notifications");
    group.throughput(Throughput::Elements(1));

    group.bench_function("build_message", |b| {
        b.iter(|| {
            black_box(Notification::new(
                "REDIAL",
                EventName::Message,
                Some(Payload::Message {
                    message: WsMessage::from(r#"{"px":101.5,"qty":3}"#),
                    origin: "wss://api.example.com/ws".to_string(),
                }),
                TimestampFormat::Structured,
            ))
        })
    });

    group.bench_function("to_json", |b| {
        let notification = Notification::new(
            "REDIAL",
            EventName::ReconnectAttempt,
            Some(Payload::ReconnectAttempt { count: 3 }),
            TimestampFormat::String,
        );
        b.iter(|| black_box(notification.to_json()))
    });

    group.bench_function("parse_command", |b| {
        b.iter(|| {
            black_box(Command::parse(
                black_box("FEED::CONNECT"),
                json!({ "url": "wss://api.example.com/ws", "protocols": ["v1"] }),
            ))
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_atomic_state,
    bench_reconnection_strategies,
    bench_notifications
);
criterion_main!(benches);
