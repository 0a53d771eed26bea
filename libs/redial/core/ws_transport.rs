//! tokio-tungstenite transport
//!
//! One tokio task per socket. The task connects, reports `Open`, then
//! multiplexes inbound frames and [`SocketCommand`]s until the socket
//! closes, and finally reports exactly one `Close`.

use crate::traits::*;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsWrite = futures::stream::SplitSink<WsStream, Message>;
type WsRead = futures::stream::SplitStream<WsStream>;

/// How long a locally initiated close waits for the peer's close frame
pub const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Transport`] over `tokio_tungstenite::connect_async`
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TungsteniteTransport {
    fn open(&self, request: OpenRequest, events: SocketEvents) -> SocketHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = SocketHandle::new(request.url.clone(), events.epoch(), command_tx);
        tokio::spawn(run_socket(request, events, command_rx));
        handle
    }

    fn validate(&self, request: &OpenRequest) -> Result<()> {
        build_request(request).map(|_| ())
    }
}

/// Build the handshake request, advertising sub-protocols if any
fn build_request(request: &OpenRequest) -> Result<Request> {
    let mut ws_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| RedialError::Configuration(format!("invalid url {}: {}", request.url, e)))?;

    if !request.protocols.is_empty() {
        let value = HeaderValue::from_str(&request.protocols.join(", ")).map_err(|e| {
            RedialError::Configuration(format!("invalid sub-protocol list: {}", e))
        })?;
        ws_request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(ws_request)
}

/// Report a failure the way a browser socket does: error, then abnormal close
fn fail(events: &SocketEvents, detail: String) {
    events.emit(SocketEvent::Error(detail.clone()));
    events.emit(SocketEvent::Close {
        code: CLOSE_ABNORMAL,
        reason: detail,
        was_clean: false,
    });
}

async fn run_socket(
    request: OpenRequest,
    events: SocketEvents,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
) {
    let url = request.url.clone();
    let ws_request = match build_request(&request) {
        Ok(ws_request) => ws_request,
        Err(e) => {
            error!("{}", e);
            fail(&events, e.to_string());
            return;
        }
    };

    debug!("Connecting to {} (epoch {})", url, events.epoch());
    let connect = connect_async(ws_request);
    tokio::pin!(connect);

    let (stream, response) = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(pair) => break pair,
                Err(e) => {
                    warn!("Failed to connect to {}: {}", url, e);
                    fail(&events, e.to_string());
                    return;
                }
            },
            cmd = commands.recv() => match cmd {
                Some(SocketCommand::Close { reason, .. }) => {
                    debug!("Close requested while connecting to {}", url);
                    events.emit(SocketEvent::Close {
                        code: CLOSE_ABNORMAL,
                        reason,
                        was_clean: false,
                    });
                    return;
                }
                Some(SocketCommand::Send(_)) => {
                    warn!("Dropping frame queued before {} opened", url);
                }
                None => return,
            }
        }
    };

    let protocol = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    info!("WebSocket open: {}", url);
    events.emit(SocketEvent::Open { protocol });

    let (mut write, mut read) = stream.split();
    let closed = message_loop(&mut write, &mut read, &events, &mut commands).await;
    if let Some(closed) = closed {
        events.emit(closed);
    }
    debug!("Socket task for {} exiting", url);
}

/// Pump frames until the socket closes
///
/// Returns the `Close` event to report, or `None` when the handle was
/// dropped and nobody is listening.
async fn message_loop(
    write: &mut WsWrite,
    read: &mut WsRead,
    events: &SocketEvents,
    commands: &mut mpsc::UnboundedReceiver<SocketCommand>,
) -> Option<SocketEvent> {
    let mut peer_close: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    events.emit(SocketEvent::Message(WsMessage::Text(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    events.emit(SocketEvent::Message(WsMessage::Binary(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Peer sent close frame: {:?}", frame);
                    peer_close = Some(close_parts(frame));
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed)) | None => {
                    return Some(stream_ended(peer_close));
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    events.emit(SocketEvent::Error(e.to_string()));
                    return Some(SocketEvent::Close {
                        code: CLOSE_ABNORMAL,
                        reason: e.to_string(),
                        was_clean: false,
                    });
                }
            },
            cmd = commands.recv() => match cmd {
                Some(SocketCommand::Send(message)) => {
                    if let Err(e) = write.send(to_tungstenite(message)).await {
                        error!("Failed to send frame: {}", e);
                        events.emit(SocketEvent::Error(e.to_string()));
                        return Some(SocketEvent::Close {
                            code: CLOSE_ABNORMAL,
                            reason: e.to_string(),
                            was_clean: false,
                        });
                    }
                }
                Some(SocketCommand::Close { code, reason }) => {
                    return Some(close_locally(write, read, code, reason).await);
                }
                None => {
                    let _ = write.close().await;
                    return None;
                }
            }
        }
    }
}

/// Send our close frame and wait for the peer to answer
async fn close_locally(
    write: &mut WsWrite,
    read: &mut WsRead,
    code: u16,
    reason: String,
) -> SocketEvent {
    let frame = CloseFrame {
        code: CloseCode::from(sendable_close_code(code)),
        reason: reason.clone().into(),
    };
    if let Err(e) = write.send(Message::Close(Some(frame))).await {
        debug!("Close frame not sent: {}", e);
        return SocketEvent::Close {
            code,
            reason,
            was_clean: false,
        };
    }

    let drain = async {
        let mut echoed = None;
        while let Some(Ok(msg)) = read.next().await {
            if let Message::Close(frame) = msg {
                echoed = Some(close_parts(frame));
            }
        }
        echoed
    };

    match tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await {
        Ok(Some((echoed_code, _))) => SocketEvent::Close {
            code: echoed_code,
            reason,
            was_clean: true,
        },
        Ok(None) => SocketEvent::Close {
            code,
            reason,
            was_clean: false,
        },
        Err(_) => {
            warn!("Peer did not answer close within {:?}", CLOSE_HANDSHAKE_TIMEOUT);
            SocketEvent::Close {
                code: CLOSE_ABNORMAL,
                reason,
                was_clean: false,
            }
        }
    }
}

fn stream_ended(peer_close: Option<(u16, String)>) -> SocketEvent {
    match peer_close {
        Some((code, reason)) => SocketEvent::Close {
            code,
            reason,
            was_clean: true,
        },
        None => SocketEvent::Close {
            code: CLOSE_ABNORMAL,
            reason: "connection closed without a close frame".to_string(),
            was_clean: false,
        },
    }
}

fn close_parts(frame: Option<CloseFrame<'_>>) -> (u16, String) {
    match frame {
        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
        None => (CLOSE_NO_STATUS, String::new()),
    }
}

/// Codes that may not appear on the wire fall back to normal closure
fn sendable_close_code(code: u16) -> u16 {
    match code {
        1000..=1003 | 1007..=1014 | 3000..=4999 => code,
        _ => CLOSE_NORMAL,
    }
}

fn to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}
