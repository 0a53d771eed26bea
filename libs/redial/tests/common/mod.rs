//! Common test utilities for Redial integration tests
//!
//! - [`Harness`]: a [`ConnectionManager`] over a [`MockTransport`] and a
//!   [`ManualTimer`], driven synchronously by the test
//! - [`MockWsServer`]: a real tokio-tungstenite echo server

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use redial::{
    Command, ConnectionManager, EventName, Input, ManagerOptions, ManualTimer, Notification,
    OpenRequest, SocketCommand, SocketEvent, SocketEvents, SocketHandle, Transport,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Install a test-friendly tracing subscriber once (RUST_LOG controls it)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One socket opened through [`MockTransport`]
pub struct OpenedSocket {
    pub request: OpenRequest,
    pub epoch: u64,
    pub events: SocketEvents,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
}

impl OpenedSocket {
    /// Commands the manager issued to this socket so far
    pub fn drain_commands(&mut self) -> Vec<SocketCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            commands.push(command);
        }
        commands
    }
}

/// Transport that records opens and never touches the network
#[derive(Clone, Default)]
pub struct MockTransport {
    opened: Arc<Mutex<Vec<OpenedSocket>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn last_epoch(&self) -> Option<u64> {
        self.opened.lock().last().map(|s| s.epoch)
    }

    pub fn requests(&self) -> Vec<OpenRequest> {
        self.opened.lock().iter().map(|s| s.request.clone()).collect()
    }

    /// Commands issued to the socket with `epoch`
    pub fn commands_for(&self, epoch: u64) -> Vec<SocketCommand> {
        self.opened
            .lock()
            .iter_mut()
            .find(|s| s.epoch == epoch)
            .map(|s| s.drain_commands())
            .unwrap_or_default()
    }

    /// Event sink of the socket with `epoch`, as a real socket task holds it
    pub fn events_for(&self, epoch: u64) -> Option<SocketEvents> {
        self.opened
            .lock()
            .iter()
            .find(|s| s.epoch == epoch)
            .map(|s| s.events.clone())
    }
}

impl Transport for MockTransport {
    fn open(&self, request: OpenRequest, events: SocketEvents) -> SocketHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = events.epoch();
        let handle = SocketHandle::new(request.url.clone(), epoch, tx);
        self.opened.lock().push(OpenedSocket {
            request,
            epoch,
            events,
            commands: rx,
        });
        handle
    }
}

/// Synchronous driver around a [`ConnectionManager`] with a fake clock
pub struct Harness {
    pub manager: ConnectionManager,
    pub transport: MockTransport,
    pub timer: ManualTimer,
    inputs: mpsc::UnboundedReceiver<Input>,
    notifications: Receiver<Notification>,
}

impl Harness {
    pub fn new(options: ManagerOptions) -> Self {
        let transport = MockTransport::new();
        let timer = ManualTimer::new();
        let (input_tx, inputs) = mpsc::unbounded_channel();
        let (event_tx, notifications) = crossbeam_channel::unbounded();

        let manager = ConnectionManager::new(
            options,
            Arc::new(transport.clone()),
            Box::new(timer.clone()),
            input_tx,
            event_tx,
        );

        Self {
            manager,
            transport,
            timer,
            inputs,
            notifications,
        }
    }

    /// Harness with 100ms base backoff, 1s cap and the given retry budget
    pub fn with_retries(max_retries: Option<usize>) -> Self {
        let options = ManagerOptions::builder()
            .reconnect_interval(Duration::from_millis(100))
            .max_reconnect_interval(Duration::from_secs(1))
            .max_retries(max_retries)
            .build()
            .unwrap();
        Self::new(options)
    }

    pub fn execute(&mut self, command: Command) -> redial::Result<bool> {
        self.manager.execute(command)
    }

    pub fn connect(&mut self, url: &str) -> u64 {
        self.execute(Command::connect(url, vec![])).unwrap();
        self.epoch()
    }

    /// Epoch of the most recently opened socket
    pub fn epoch(&self) -> u64 {
        self.transport.last_epoch().expect("no socket opened yet")
    }

    pub fn socket_event(&mut self, epoch: u64, event: SocketEvent) {
        self.manager.handle(Input::Socket { epoch, event });
    }

    pub fn open(&mut self, epoch: u64) {
        self.socket_event(epoch, SocketEvent::Open { protocol: None });
    }

    pub fn close(&mut self, epoch: u64, reason: &str) {
        self.socket_event(
            epoch,
            SocketEvent::Close {
                code: 1006,
                reason: reason.to_string(),
                was_clean: false,
            },
        );
    }

    /// Advance the fake clock and hand every due tick to the manager
    pub fn advance(&mut self, by: Duration) {
        for tick in self.timer.advance(by) {
            self.manager.handle(Input::Tick(tick));
        }
    }

    /// Feed whatever socket tasks posted on the input channel
    pub fn pump(&mut self) -> usize {
        let mut count = 0;
        while let Ok(input) = self.inputs.try_recv() {
            self.manager.handle(input);
            count += 1;
        }
        count
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.try_iter().collect()
    }

    pub fn events(&self) -> Vec<EventName> {
        self.notifications().into_iter().map(|n| n.event).collect()
    }
}

/// Mock tokio-tungstenite server: echoes data frames, picks the first
/// requested sub-protocol, and can drop every client on demand
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    kick: broadcast::Sender<()>,
    accepted: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let (kick, _) = broadcast::channel(16);
        let accepted = Arc::new(AtomicUsize::new(0));

        let shutdown_clone = Arc::clone(&shutdown);
        let kick_clone = kick.clone();
        let accepted_clone = Arc::clone(&accepted);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let kick = kick_clone.subscribe();
                                let accepted = Arc::clone(&accepted_clone);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, kick, accepted).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            kick,
            accepted,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mut kick: broadcast::Receiver<()>,
        accepted: Arc<AtomicUsize>,
    ) {
        let select_protocol = |request: &Request,
                               mut response: Response|
         -> std::result::Result<Response, ErrorResponse> {
            let first = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|value| value.to_str().ok())
                .and_then(|list| list.split(',').next())
                .map(|p| p.trim().to_string());
            if let Some(protocol) = first {
                if let Ok(value) = HeaderValue::from_str(&protocol) {
                    response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                }
            }
            Ok(response)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, select_protocol).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };
        accepted.fetch_add(1, Ordering::SeqCst);

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if msg.is_text() || msg.is_binary() {
                                // Echo the message back
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = kick.recv() => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "server restarting".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    // let the client answer the close before dropping the stream
                    let _ = tokio::time::timeout(Duration::from_secs(1), async {
                        while let Some(Ok(_)) = read.next().await {}
                    })
                    .await;
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of completed handshakes
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Close every connected client with 1001 "server restarting"
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A ws:// URL nobody listens on
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}
