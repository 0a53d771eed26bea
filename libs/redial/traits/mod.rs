//! # Redial Traits
//!
//! Core traits and types shared by the connection manager and its
//! collaborators:
//!
//! - **ReconnectionStrategy**: how long to wait between retries, and when to give up
//! - **Serializer**: turn SEND payloads into wire frames
//! - **Timer**: deferred callbacks for backoff delays and attempt timeouts
//! - **Transport**: open native sockets and report their events

pub mod error;
pub mod message;
pub mod reconnect;
pub mod serializer;
pub mod timer;
pub mod transport;

// Re-export commonly used types
pub use error::{RedialError, Result};
pub use message::WsMessage;
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use serializer::{JsonSerializer, Serializer};
pub use timer::{Tick, TickKind, Timer};
pub use transport::{
    EventSink, OpenRequest, SocketCommand, SocketEvent, SocketEvents, SocketHandle, Transport,
    CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_NO_STATUS,
};
