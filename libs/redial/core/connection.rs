//! Connection manager: the reconnection state machine
//!
//! Owns at most one socket at a time, turns native socket events into
//! notifications, and drives the [`RetryScheduler`] on failures. All state
//! changes go through [`ConnectionManager::handle`], one [`Input`] at a
//! time, on a single event loop.
//!
//! ```text
//!   Idle ──CONNECT──> Connecting ──open──> Connected
//!                        ▲    │               │
//!          backoff tick  │    └─close─┐  close│
//!                        │            ▼       ▼
//!                      Reconnecting <─ retry decision ─> Abandoned
//!
//!   any state ──DISCONNECT──> Closed   (never re-enters Connecting on its own)
//! ```
//!
//! Every socket gets a fresh epoch. Events stamped with any other epoch come
//! from a superseded socket and are dropped.

use crate::config::ManagerOptions;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::events::{Command, CommandKind, EventName, Notification, Notifier, Payload};
use crate::scheduler::{RetryDecision, RetryScheduler, SchedulerState, TickAction};
use crate::traits::*;
use crossbeam_channel::Sender;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Reason sent with a DISCONNECT that does not carry one
pub const DEFAULT_DISCONNECT_REASON: &str = "WebSocket connection closed by client";

/// Reason reported when an attempt is forced closed
pub const ATTEMPT_TIMEOUT_REASON: &str = "connection attempt timed out";

/// Reply channel for a command: `Ok(true)` handled, `Ok(false)` addressed
/// to another prefix
pub type CommandReply = oneshot::Sender<Result<bool>>;

/// Everything the manager reacts to
#[derive(Debug)]
pub enum Input {
    /// Command from the application
    Command {
        command: Command,
        reply: Option<CommandReply>,
    },
    /// Native event from the socket opened with `epoch`
    Socket { epoch: u64, event: SocketEvent },
    /// A scheduler timer fired
    Tick(Tick),
    /// Close everything and stop the event loop
    Shutdown,
}

impl EventSink for mpsc::UnboundedSender<Input> {
    fn deliver(&self, epoch: u64, event: SocketEvent) -> bool {
        self.send(Input::Socket { epoch, event }).is_ok()
    }
}

struct LiveSocket {
    epoch: u64,
    handle: SocketHandle,
    opened: bool,
    closed: bool,
}

/// State machine for one logical WebSocket connection
pub struct ConnectionManager {
    options: ManagerOptions,
    transport: Arc<dyn Transport>,
    retrier: RetryScheduler,
    notifier: Notifier,
    sink: Arc<dyn EventSink>,
    target: Option<OpenRequest>,
    socket: Option<LiveSocket>,
    has_opened: bool,
    epoch: u64,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
}

impl ConnectionManager {
    /// Create a manager
    ///
    /// `inputs` is the sender side of the event loop feeding [`handle`]:
    /// socket tasks post their events there. Notifications go to
    /// `notifications`.
    ///
    /// [`handle`]: ConnectionManager::handle
    pub fn new(
        mut options: ManagerOptions,
        transport: Arc<dyn Transport>,
        timer: Box<dyn Timer>,
        inputs: mpsc::UnboundedSender<Input>,
        notifications: Sender<Notification>,
    ) -> Self {
        let strategy = options.take_strategy();
        let notifier = Notifier::new(
            options.prefix.clone(),
            options.timestamp_format,
            notifications,
        );

        Self {
            retrier: RetryScheduler::new(strategy, timer),
            notifier,
            options,
            transport,
            sink: Arc::new(inputs),
            target: None,
            socket: None,
            has_opened: false,
            epoch: 0,
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Idle)),
            metrics: Arc::new(AtomicMetrics::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        self.notifier.prefix()
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn state_handle(&self) -> Arc<AtomicConnectionState> {
        Arc::clone(&self.state)
    }

    pub fn metrics_handle(&self) -> Arc<AtomicMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Whether any socket opened since the last deliberate close
    pub fn has_opened(&self) -> bool {
        self.has_opened
    }

    /// Whether a socket handle is held (open, connecting or closed by the peer)
    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }

    /// Epoch of the live socket, if any
    pub fn socket_epoch(&self) -> Option<u64> {
        self.socket.as_ref().map(|s| s.epoch)
    }

    /// Attempts made in the current retry cycle
    pub fn attempts(&self) -> u32 {
        self.retrier.attempts()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.retrier.state()
    }

    /// Single state-transition entry point
    pub fn handle(&mut self, input: Input) {
        match input {
            Input::Command { command, reply } => {
                let result = self.execute(command);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                } else if let Err(e) = result {
                    warn!("Command failed: {}", e);
                }
            }
            Input::Socket { epoch, event } => self.on_socket_event(epoch, event),
            Input::Tick(tick) => self.on_tick(tick),
            Input::Shutdown => self.shutdown(),
        }
    }

    /// Run a command; errors only on misuse of the command surface
    pub fn execute(&mut self, command: Command) -> Result<bool> {
        if command.prefix != self.prefix() {
            debug!(
                "Ignoring {} addressed to prefix '{}'",
                command.type_name(),
                command.prefix
            );
            return Ok(false);
        }

        match command.kind {
            CommandKind::Connect { url, protocols } => self.handle_connect(url, protocols)?,
            CommandKind::Disconnect { reason } => self.handle_disconnect(reason)?,
            CommandKind::Send { payload } => self.handle_send(&payload)?,
        }
        Ok(true)
    }

    /// Deliberately close the socket and mark the manager as shutting down
    pub fn shutdown(&mut self) {
        info!("Shutting down connection manager '{}'", self.prefix());
        self.close(CLOSE_NORMAL, "client shutting down");
        self.retrier.stop();
        self.target = None;
        self.state.set(ConnectionState::ShuttingDown);
    }

    fn handle_connect(&mut self, url: String, protocols: Vec<String>) -> Result<()> {
        let request = OpenRequest { url, protocols };
        // a target that can never form a handshake is rejected up front
        self.transport.validate(&request)?;
        info!("CONNECT {} (prefix '{}')", request.url, self.prefix());
        self.close(CLOSE_NORMAL, "replaced by a new connection");

        self.target = Some(request);
        self.retrier.reset();
        let attempt = self.retrier.attempt(self.options.attempt_timeout);
        self.open_connection(attempt);
        Ok(())
    }

    fn handle_disconnect(&mut self, reason: Option<String>) -> Result<()> {
        if self.socket.is_none() {
            return Err(RedialError::not_initialized());
        }

        let reason = reason.unwrap_or_else(|| DEFAULT_DISCONNECT_REASON.to_string());
        info!("DISCONNECT '{}': {}", self.prefix(), reason);
        // a socket the peer already closed has reported its CLOSED
        let was_live = self.socket.as_ref().is_some_and(|socket| !socket.closed);
        self.close(CLOSE_NORMAL, &reason);
        self.target = None;
        self.state.set(ConnectionState::Closed);
        if was_live {
            self.notifier.emit(
                EventName::Closed,
                Some(Payload::Closed {
                    code: CLOSE_NORMAL,
                    reason,
                    was_clean: true,
                }),
            );
        }
        Ok(())
    }

    fn handle_send(&mut self, payload: &Value) -> Result<()> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(RedialError::not_initialized());
        };
        let Some(serializer) = self.options.serializer.as_ref() else {
            return Err(RedialError::Configuration(
                "no serializer configured for SEND".to_string(),
            ));
        };
        if !socket.opened || socket.closed {
            return Err(RedialError::InvalidState(format!(
                "socket to {} is not open",
                socket.handle.url()
            )));
        }

        let frame = serializer.serialize(payload)?;
        socket.handle.send(frame)?;
        self.metrics.increment_sent();
        Ok(())
    }

    /// Connect callback of the retry scheduler
    fn open_connection(&mut self, attempt: u32) {
        let Some(request) = self.target.clone() else {
            warn!("Attempt {} without a connection target, ignoring", attempt);
            return;
        };

        let retries = attempt.saturating_sub(1);
        if retries > 0 {
            if retries == 1 {
                self.notifier.emit(EventName::BeginReconnect, None);
            }
            self.notifier.emit(
                EventName::ReconnectAttempt,
                Some(Payload::ReconnectAttempt { count: retries }),
            );
        }

        // retire the previous socket before a new one can report anything
        if let Some(previous) = self.socket.take() {
            if !previous.closed {
                previous.handle.close(CLOSE_NORMAL, "superseded by a new attempt");
            }
        }

        self.epoch = self.epoch.wrapping_add(1);
        self.state.set(if retries == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        });
        self.metrics.increment_attempts();
        debug!(
            "Opening socket to {} (attempt {}, epoch {})",
            request.url, attempt, self.epoch
        );

        let events = SocketEvents::new(self.epoch, Arc::clone(&self.sink));
        let handle = self.transport.open(request, events);
        self.socket = Some(LiveSocket {
            epoch: self.epoch,
            handle,
            opened: false,
            closed: false,
        });
    }

    fn on_socket_event(&mut self, epoch: u64, event: SocketEvent) {
        let live = match self.socket.as_ref() {
            Some(socket) if socket.epoch == epoch => !socket.closed,
            _ => false,
        };
        if !live {
            debug!("Dropping {} from retired socket (epoch {})", event.name(), epoch);
            return;
        }

        match event {
            SocketEvent::Open { protocol } => self.on_open(protocol),
            SocketEvent::Message(message) => self.on_message(message),
            SocketEvent::Error(detail) => self.on_error(detail),
            SocketEvent::Close {
                code,
                reason,
                was_clean,
            } => self.on_close(code, reason, was_clean),
        }
    }

    fn on_open(&mut self, protocol: Option<String>) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        socket.opened = true;
        let handle = socket.handle.clone();

        self.retrier.stop();
        self.retrier.reset();
        self.state.set(ConnectionState::Connected);
        info!("Connected to {}", handle.url());

        if self.has_opened {
            self.metrics.increment_reconnects();
            self.notifier.emit(EventName::Reconnected, None);
        }
        if let Some(hook) = self.options.on_open.as_ref() {
            hook(&handle);
        }
        self.notifier.emit(
            EventName::Open,
            Some(Payload::Open {
                url: handle.url().to_string(),
                protocol,
            }),
        );
        self.has_opened = true;
    }

    fn on_message(&mut self, message: WsMessage) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        let origin = socket.handle.url().to_string();
        self.metrics.increment_received();
        self.notifier
            .emit(EventName::Message, Some(Payload::Message { message, origin }));
    }

    fn on_error(&mut self, detail: String) {
        error!("WebSocket error: {}", detail);
        self.notifier.emit(
            EventName::Error,
            Some(Payload::Error {
                message: format!("`{}` websocket connection error: {}", self.prefix(), detail),
            }),
        );
    }

    fn on_close(&mut self, code: u16, reason: String, was_clean: bool) {
        if let Some(socket) = self.socket.as_mut() {
            socket.closed = true;
        }
        warn!("Socket closed (code {}): {}", code, reason);
        self.notifier.emit(
            EventName::Closed,
            Some(Payload::Closed {
                code,
                reason: reason.clone(),
                was_clean,
            }),
        );

        if self.options.reconnect_on_close {
            self.attempt_reconnection(&reason);
        } else {
            self.retrier.stop();
            self.state.set(ConnectionState::Closed);
        }
    }

    fn attempt_reconnection(&mut self, reason: &str) {
        match self.retrier.retry(reason) {
            RetryDecision::Scheduled { attempt, delay } => {
                info!("Reconnecting in {:?} (attempt {})", delay, attempt);
                self.state.set(ConnectionState::Reconnecting);
                self.notifier.emit(EventName::Broken, None);
            }
            RetryDecision::Abandoned => {
                warn!("Reconnection abandoned for '{}'", self.prefix());
                self.state.set(ConnectionState::Abandoned);
                self.notifier.emit(EventName::ReconnectAbandoned, None);
            }
            RetryDecision::Ignored => {}
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        match self.retrier.on_tick(tick) {
            Some(TickAction::Connect(attempt)) => self.open_connection(attempt),
            Some(TickAction::TimedOut(attempt)) => self.on_attempt_timeout(attempt),
            None => {}
        }
    }

    /// Force-fail an attempt that neither opened nor closed in time
    fn on_attempt_timeout(&mut self, attempt: u32) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        if socket.opened || socket.closed {
            return;
        }

        warn!(
            "Attempt {} to {} timed out after {:?}",
            attempt,
            socket.handle.url(),
            self.options.attempt_timeout
        );
        socket.handle.close(CLOSE_NORMAL, ATTEMPT_TIMEOUT_REASON);
        // the socket may never report its close while half-open
        self.on_close(CLOSE_ABNORMAL, ATTEMPT_TIMEOUT_REASON.to_string(), false);
    }

    /// Deliberate close: no-op without a socket
    ///
    /// The retrier is stopped before the native close is issued, so the
    /// close this produces can never start a reconnect cycle.
    fn close(&mut self, code: u16, reason: &str) {
        let Some(socket) = self.socket.take() else {
            return;
        };

        self.retrier.stop();
        if !socket.closed {
            socket.handle.close(code, reason);
        }
        self.has_opened = false;
        debug!("Closed socket epoch {} ({})", socket.epoch, reason);
    }
}
