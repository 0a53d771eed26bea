//! Socket transport abstraction
//!
//! A [`Transport`] opens one native socket per connection attempt. The
//! socket reports its lifecycle through [`SocketEvents`] (tagged with the
//! epoch the connection manager assigned to it) and is driven through the
//! returned [`SocketHandle`].
//!
//! ```text
//! ConnectionManager ──open(request, events)──> Transport
//!        ▲                                        │
//!        │                                 spawns socket task
//!        │                                        │
//!        └──── EventSink::deliver(epoch, event) ──┘
//!        ──── SocketCommand (send / close) ──────>
//! ```

use crate::error::{RedialError, Result};
use crate::message::WsMessage;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Normal closure status code
pub const CLOSE_NORMAL: u16 = 1000;

/// No status code was present in the close frame
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// WebSocket URL (wss:// or ws://)
    pub url: String,
    /// Requested sub-protocols, in preference order
    pub protocols: Vec<String>,
}

/// Native socket events, the complete set the manager reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Opening handshake completed
    Open {
        /// Sub-protocol selected by the server
        protocol: Option<String>,
    },
    /// Data frame received
    Message(WsMessage),
    /// Transport-level failure; always followed by `Close`
    Error(String),
    /// Socket closed, by either side
    Close {
        code: u16,
        reason: String,
        was_clean: bool,
    },
}

impl SocketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SocketEvent::Open { .. } => "open",
            SocketEvent::Message(_) => "message",
            SocketEvent::Error(_) => "error",
            SocketEvent::Close { .. } => "close",
        }
    }
}

/// Instructions from the manager to a socket task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketCommand {
    Send(WsMessage),
    Close { code: u16, reason: String },
}

/// Receiver of epoch-stamped socket events, normally the manager's event loop
pub trait EventSink: Send + Sync + 'static {
    /// Deliver one event; false once the receiver is gone
    fn deliver(&self, epoch: u64, event: SocketEvent) -> bool;
}

/// Event reporter handed to a socket task
///
/// Every event is stamped with the socket's epoch before it reaches the
/// sink.
#[derive(Clone)]
pub struct SocketEvents {
    epoch: u64,
    sink: Arc<dyn EventSink>,
}

impl SocketEvents {
    pub fn new(epoch: u64, sink: Arc<dyn EventSink>) -> Self {
        Self { epoch, sink }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Report an event; returns false once the sink is gone
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.sink.deliver(self.epoch, event)
    }
}

impl fmt::Debug for SocketEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEvents")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// Raw handle to one native socket
///
/// Cheap to clone. This is what the on-open hook receives.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    url: String,
    epoch: u64,
    commands: mpsc::UnboundedSender<SocketCommand>,
}

impl SocketHandle {
    pub fn new(
        url: impl Into<String>,
        epoch: u64,
        commands: mpsc::UnboundedSender<SocketCommand>,
    ) -> Self {
        Self {
            url: url.into(),
            epoch,
            commands,
        }
    }

    /// URL this socket was opened against
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue a frame on the socket
    pub fn send(&self, message: WsMessage) -> Result<()> {
        self.commands
            .send(SocketCommand::Send(message))
            .map_err(|_| RedialError::ConnectionClosed(format!("socket to {} is gone", self.url)))
    }

    /// Ask the socket to close; a socket that already finished ignores it
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.commands.send(SocketCommand::Close {
            code,
            reason: reason.into(),
        });
    }

    /// True once the socket task has exited
    pub fn is_finished(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Opens native sockets
///
/// `open` must not block: implementations start the connection in the
/// background and report progress through `events`. Each opened socket
/// must eventually emit exactly one `Close` unless the handle's command
/// channel is dropped first.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, request: OpenRequest, events: SocketEvents) -> SocketHandle;

    /// Reject a request this transport could never dial
    ///
    /// Checked on CONNECT, before any socket is touched.
    fn validate(&self, _request: &OpenRequest) -> Result<()> {
        Ok(())
    }
}
