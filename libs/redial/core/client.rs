use crate::clock::TokioTimer;
use crate::config::ManagerOptions;
use crate::connection::{ConnectionManager, Input};
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::events::{Command, Notification};
use crate::traits::*;
use crate::ws_transport::TungsteniteTransport;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Client metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub connect_attempts: u64,
    pub connection_state: ConnectionState,
}

/// Reconnecting WebSocket client
///
/// Owns one [`ConnectionManager`] running on its own tokio task. Commands
/// are posted to that task and answered over a oneshot, so `connect`,
/// `send` and `disconnect` report misuse errors to the caller directly.
/// Lifecycle notifications arrive on an unbounded crossbeam channel.
///
/// Must be created from within a tokio runtime.
pub struct RedialClient {
    prefix: String,
    /// Atomic connection state, shared with the manager task
    state: Arc<AtomicConnectionState>,
    /// Atomic metrics, shared with the manager task
    metrics: Arc<AtomicMetrics>,
    /// Input channel of the manager task
    input_tx: mpsc::UnboundedSender<Input>,
    /// Notification channel receiver
    event_rx: Receiver<Notification>,
    /// Manager task handle
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RedialClient {
    /// Create a client over tokio-tungstenite sockets
    pub fn new(options: ManagerOptions) -> Self {
        Self::with_transport(options, Arc::new(TungsteniteTransport::new()))
    }

    /// Create a client over any transport
    pub fn with_transport(options: ManagerOptions, transport: Arc<dyn Transport>) -> Self {
        let prefix = options.prefix().to_string();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = unbounded();

        let timer = Box::new(TokioTimer::new(input_tx.clone()));
        let manager =
            ConnectionManager::new(options, transport, timer, input_tx.clone(), event_tx);
        let state = manager.state_handle();
        let metrics = manager.metrics_handle();

        let task_handle = tokio::spawn(run_manager(manager, input_rx));
        info!("Started redial client '{}'", prefix);

        Self {
            prefix,
            state,
            metrics,
            input_tx,
            event_rx,
            task_handle: Mutex::new(Some(task_handle)),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Dispatch a command; `Ok(false)` if it is addressed to another prefix
    pub async fn dispatch(&self, command: Command) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.input_tx
            .send(Input::Command {
                command,
                reply: Some(reply_tx),
            })
            .map_err(|e| RedialError::ChannelSend(e.to_string()))?;

        reply_rx
            .await
            .map_err(|e| RedialError::ChannelReceive(e.to_string()))?
    }

    /// Open a connection, replacing any existing one
    pub async fn connect(&self, url: impl Into<String>, protocols: Vec<String>) -> Result<()> {
        self.dispatch(Command::connect(url, protocols).with_prefix(self.prefix.as_str()))
            .await
            .map(|_| ())
    }

    /// Serialize `payload` with the configured serializer and transmit it
    pub async fn send<T: Serialize>(&self, payload: &T) -> Result<()> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| RedialError::Serialization(e.to_string()))?;
        self.dispatch(Command::send(payload).with_prefix(self.prefix.as_str()))
            .await
            .map(|_| ())
    }

    /// Deliberately close the connection; no reconnect follows
    pub async fn disconnect(&self, reason: Option<String>) -> Result<()> {
        let command = match reason {
            Some(reason) => Command::disconnect_with_reason(reason),
            None => Command::disconnect(),
        };
        self.dispatch(command.with_prefix(self.prefix.as_str()))
            .await
            .map(|_| ())
    }

    /// Get current connection state
    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Check if connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        Metrics {
            messages_sent: self.metrics.messages_sent(),
            messages_received: self.metrics.messages_received(),
            reconnect_count: self.metrics.reconnect_count(),
            connect_attempts: self.metrics.connect_attempts(),
            connection_state: self.state.get(),
        }
    }

    /// Try to receive a notification (non-blocking)
    pub fn try_recv_event(&self) -> Option<Notification> {
        self.event_rx.try_recv().ok()
    }

    /// Receive a notification (blocking)
    pub fn recv_event(&self) -> std::result::Result<Notification, crossbeam_channel::RecvError> {
        self.event_rx.recv()
    }

    /// Receive a notification, blocking for at most `timeout`
    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<Notification> {
        self.event_rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => {
                RedialError::Timeout(format!("no notification within {:?}", timeout))
            }
            RecvTimeoutError::Disconnected => RedialError::ChannelReceive(e.to_string()),
        })
    }

    /// Async wait for the next notification, without blocking the runtime
    pub async fn next_event(&self, timeout: Duration) -> Result<Notification> {
        if let Some(notification) = self.try_recv_event() {
            return Ok(notification);
        }

        let rx = self.event_rx.clone();
        tokio::task::spawn_blocking(move || rx.recv_timeout(timeout))
            .await
            .map_err(|e| RedialError::Other(e.to_string()))?
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    RedialError::Timeout(format!("no notification within {:?}", timeout))
                }
                RecvTimeoutError::Disconnected => RedialError::ChannelReceive(e.to_string()),
            })
    }

    /// Clone of the notification receiver, for fan-in elsewhere
    pub fn events(&self) -> Receiver<Notification> {
        self.event_rx.clone()
    }

    /// Close the connection and stop the manager task
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down redial client '{}'", self.prefix);
        let _ = self.input_tx.send(Input::Shutdown);

        let handle = self.task_handle.lock().take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| RedialError::Other(format!("manager task failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for RedialClient {
    fn drop(&mut self) {
        let _ = self.input_tx.send(Input::Shutdown);
    }
}

/// Manager task loop
async fn run_manager(mut manager: ConnectionManager, mut input_rx: mpsc::UnboundedReceiver<Input>) {
    while let Some(input) = input_rx.recv().await {
        let shutdown = matches!(input, Input::Shutdown);
        manager.handle(input);
        if shutdown {
            break;
        }
    }
    debug!("Manager task for '{}' exiting", manager.prefix());
}
