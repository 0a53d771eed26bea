//! # Redial
//!
//! A reconnecting WebSocket connection manager.
//!
//! ## Features
//!
//! - **Single-threaded state machine**: every socket event, timer tick and command
//!   goes through one `handle` entry point on one task
//! - **Exponential backoff**: bounded or unbounded retries with a per-attempt timeout
//! - **Stale-event safety**: sockets and timers carry epochs, superseded ones are ignored
//! - **Namespaced notifications**: `<prefix>::<EVENT>` lifecycle events over crossbeam
//! - **Pluggable seams**: transport, timer, serializer and reconnection strategy are traits

pub mod traits;
pub mod core;
pub mod manager;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use crate::core::{
    client, clock, config, connection, connection_state, events, scheduler, ws_transport,
    client::{Metrics, RedialClient},
    clock::{ManualTimer, TokioTimer},
    config::{ConfigError, ManagerOptions, ManagerOptionsBuilder, OnOpenHook, RedialConfig},
    connection::{ConnectionManager, Input},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    events::{
        Command, CommandKind, EventName, Notification, Payload, Timestamp, TimestampFormat,
        DEFAULT_PREFIX,
    },
    scheduler::{RetryDecision, RetryScheduler, SchedulerState, TickAction},
    ws_transport::TungsteniteTransport,
};

// Re-export manager
pub use manager::ClientManager;
