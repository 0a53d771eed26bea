//! Notifications emitted by the connection manager and commands it accepts
//!
//! Every notification and command type is namespaced as
//! `<prefix>::<EVENT_NAME>`, so several managers can share one bus.
//!
//! ```text
//! {
//!   "type": "REDIAL::RECONNECT_ATTEMPT",
//!   "meta": { "timestamp": "2024-05-01T12:00:00.000Z" },
//!   "payload": { "count": 1 }
//! }
//! ```

use crate::error::{RedialError, Result};
use crate::message::WsMessage;
use chrono::{DateTime, SecondsFormat, Utc};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

/// Prefix used when none is configured
pub const DEFAULT_PREFIX: &str = "REDIAL";

/// Separator between prefix and event name
pub const TYPE_SEPARATOR: &str = "::";

/// Event names shared by commands and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Connect,
    Disconnect,
    Send,
    BeginReconnect,
    ReconnectAttempt,
    Reconnected,
    ReconnectAbandoned,
    Open,
    Broken,
    Closed,
    Message,
    Error,
}

impl EventName {
    pub const ALL: [EventName; 12] = [
        EventName::Connect,
        EventName::Disconnect,
        EventName::Send,
        EventName::BeginReconnect,
        EventName::ReconnectAttempt,
        EventName::Reconnected,
        EventName::ReconnectAbandoned,
        EventName::Open,
        EventName::Broken,
        EventName::Closed,
        EventName::Message,
        EventName::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Connect => "CONNECT",
            EventName::Disconnect => "DISCONNECT",
            EventName::Send => "SEND",
            EventName::BeginReconnect => "BEGIN_RECONNECT",
            EventName::ReconnectAttempt => "RECONNECT_ATTEMPT",
            EventName::Reconnected => "RECONNECTED",
            EventName::ReconnectAbandoned => "RECONNECT_ABANDONED",
            EventName::Open => "OPEN",
            EventName::Broken => "BROKEN",
            EventName::Closed => "CLOSED",
            EventName::Message => "MESSAGE",
            EventName::Error => "ERROR",
        }
    }

    /// Full type string under `prefix`
    pub fn type_for(&self, prefix: &str) -> String {
        format!("{}{}{}", prefix, TYPE_SEPARATOR, self.as_str())
    }

    /// Whether this name is an inbound command
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            EventName::Connect | EventName::Disconnect | EventName::Send
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = RedialError;

    fn from_str(s: &str) -> Result<Self> {
        EventName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| RedialError::ParseError(format!("unknown event name '{}'", s)))
    }
}

/// How `meta.timestamp` is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// Keep the `DateTime<Utc>` value
    #[default]
    Structured,
    /// RFC 3339 string with millisecond precision
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Timestamp {
    Structured(DateTime<Utc>),
    Text(String),
}

impl Timestamp {
    pub fn now(format: TimestampFormat) -> Self {
        Self::at(Utc::now(), format)
    }

    pub fn at(instant: DateTime<Utc>, format: TimestampFormat) -> Self {
        match format {
            TimestampFormat::Structured => Timestamp::Structured(instant),
            TimestampFormat::String => {
                Timestamp::Text(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }

    /// The structured value, parsing the string form if needed
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Structured(dt) => Some(*dt),
            Timestamp::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub timestamp: Timestamp,
}

/// Notification payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// RECONNECT_ATTEMPT: retries so far in this cycle
    ReconnectAttempt { count: u32 },
    /// OPEN
    Open {
        url: String,
        protocol: Option<String>,
    },
    /// CLOSED
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
    },
    /// MESSAGE: decoded body and the URL it came from
    Message { message: WsMessage, origin: String },
    /// ERROR
    Error { message: String },
}

impl Payload {
    /// Whether the payload represents a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Payload::Error { .. })
    }
}

/// One lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip)]
    pub event: EventName,
    pub meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
}

impl Notification {
    pub fn new(
        prefix: &str,
        event: EventName,
        payload: Option<Payload>,
        format: TimestampFormat,
    ) -> Self {
        let error = payload
            .as_ref()
            .filter(|p| p.is_failure())
            .map(|_| true);
        Self {
            kind: event.type_for(prefix),
            event,
            meta: Meta {
                timestamp: Timestamp::now(format),
            },
            payload,
            error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error == Some(true)
    }

    /// RECONNECT_ATTEMPT count, if this is one
    pub fn reconnect_count(&self) -> Option<u32> {
        match self.payload {
            Some(Payload::ReconnectAttempt { count }) => Some(count),
            _ => None,
        }
    }

    /// MESSAGE body, if this is one
    pub fn message(&self) -> Option<&WsMessage> {
        match &self.payload {
            Some(Payload::Message { message, .. }) => Some(message),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RedialError::Serialization(e.to_string()))
    }
}

/// Builds and publishes notifications for one manager
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    prefix: String,
    format: TimestampFormat,
    tx: Sender<Notification>,
}

impl Notifier {
    pub(crate) fn new(prefix: String, format: TimestampFormat, tx: Sender<Notification>) -> Self {
        Self { prefix, format, tx }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn emit(&self, event: EventName, payload: Option<Payload>) {
        let notification = Notification::new(&self.prefix, event, payload, self.format);
        trace!(?notification, "Emitting notification");
        if self.tx.send(notification).is_err() {
            debug!("Notification receiver dropped, {} not delivered", event);
        }
    }
}

/// Commands accepted by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Connect { url: String, protocols: Vec<String> },
    Disconnect { reason: Option<String> },
    Send { payload: Value },
}

impl CommandKind {
    pub fn event(&self) -> EventName {
        match self {
            CommandKind::Connect { .. } => EventName::Connect,
            CommandKind::Disconnect { .. } => EventName::Disconnect,
            CommandKind::Send { .. } => EventName::Send,
        }
    }
}

/// A command addressed to the manager owning `prefix`
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub prefix: String,
    pub kind: CommandKind,
}

#[derive(Deserialize)]
struct ConnectPayload {
    url: String,
    #[serde(default)]
    protocols: Vec<String>,
}

#[derive(Deserialize, Default)]
struct DisconnectPayload {
    #[serde(default)]
    reason: Option<String>,
}

impl Command {
    pub fn connect(url: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            kind: CommandKind::Connect {
                url: url.into(),
                protocols,
            },
        }
    }

    pub fn disconnect() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            kind: CommandKind::Disconnect { reason: None },
        }
    }

    pub fn disconnect_with_reason(reason: impl Into<String>) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            kind: CommandKind::Disconnect {
                reason: Some(reason.into()),
            },
        }
    }

    pub fn send(payload: Value) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            kind: CommandKind::Send { payload },
        }
    }

    /// Address the command to a different manager
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn event(&self) -> EventName {
        self.kind.event()
    }

    /// `<prefix>::<NAME>`
    pub fn type_name(&self) -> String {
        self.event().type_for(&self.prefix)
    }

    /// Build a command from a `<prefix>::<NAME>` type string and its payload
    ///
    /// CONNECT expects `{"url": ..., "protocols": [...]}`, DISCONNECT takes an
    /// optional `{"reason": ...}`, SEND takes any payload.
    pub fn parse(type_name: &str, payload: Value) -> Result<Self> {
        let (prefix, name) = type_name.rsplit_once(TYPE_SEPARATOR).ok_or_else(|| {
            RedialError::ParseError(format!("'{}' is not <prefix>::<NAME>", type_name))
        })?;
        if prefix.is_empty() {
            return Err(RedialError::ParseError(format!(
                "'{}' has an empty prefix",
                type_name
            )));
        }

        let kind = match name.parse::<EventName>()? {
            EventName::Connect => {
                let connect: ConnectPayload = serde_json::from_value(payload)
                    .map_err(|e| RedialError::ParseError(format!("CONNECT payload: {}", e)))?;
                CommandKind::Connect {
                    url: connect.url,
                    protocols: connect.protocols,
                }
            }
            EventName::Disconnect => {
                let disconnect = if payload.is_null() {
                    DisconnectPayload::default()
                } else {
                    serde_json::from_value(payload).map_err(|e| {
                        RedialError::ParseError(format!("DISCONNECT payload: {}", e))
                    })?
                };
                CommandKind::Disconnect {
                    reason: disconnect.reason,
                }
            }
            EventName::Send => CommandKind::Send { payload },
            other => {
                return Err(RedialError::ParseError(format!(
                    "{} is a notification, not a command",
                    other
                )))
            }
        };

        Ok(Self {
            prefix: prefix.to_string(),
            kind,
        })
    }
}
