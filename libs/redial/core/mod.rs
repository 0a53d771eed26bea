//! # Redial core
//!
//! The retry scheduler, the connection manager state machine, and the
//! client that runs a manager on a tokio task.
//!
//! ## Example
//!
//! ```rust,ignore
//! use redial::{ManagerOptions, RedialClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> redial::Result<()> {
//!     let options = ManagerOptions::builder()
//!         .prefix("FEED")
//!         .reconnect_interval(Duration::from_secs(1))
//!         .max_retries(Some(10))
//!         .build()?;
//!
//!     let client = RedialClient::new(options);
//!     client.connect("wss://api.example.com/ws", vec![]).await?;
//!
//!     while let Ok(notification) = client.next_event(Duration::from_secs(30)).await {
//!         println!("{}", notification.to_json()?);
//!     }
//!
//!     client.shutdown().await
//! }
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod events;
pub mod scheduler;
pub mod ws_transport;

// Re-export main types
pub use client::{Metrics, RedialClient};
pub use clock::{ManualTimer, TokioTimer};
pub use config::{ConfigError, ManagerOptions, ManagerOptionsBuilder, OnOpenHook, RedialConfig};
pub use connection::{ConnectionManager, Input};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use events::{Command, CommandKind, EventName, Notification, Payload, Timestamp, TimestampFormat};
pub use scheduler::{RetryDecision, RetryScheduler, SchedulerState, TickAction};
pub use ws_transport::TungsteniteTransport;

// Re-export traits for convenience
pub use crate::traits::*;
