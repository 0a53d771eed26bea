use crate::error::{RedialError, Result};
use crate::message::WsMessage;
use serde_json::Value;

/// Trait for turning SEND payloads into wire frames
///
/// The connection manager runs every SEND payload through the configured
/// serializer and transmits exactly what it returns.
///
/// Closures with the right signature implement this trait:
///
/// ```ignore
/// let options = ManagerOptions::builder()
///     .serializer(|payload: &serde_json::Value| {
///         Ok(WsMessage::Binary(serde_json::to_vec(payload).unwrap_or_default()))
///     })
///     .build()?;
/// ```
pub trait Serializer: Send + Sync + 'static {
    /// Serialize a payload into a frame
    fn serialize(&self, payload: &Value) -> Result<WsMessage>;
}

/// Default serializer: compact JSON text frames
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, payload: &Value) -> Result<WsMessage> {
        serde_json::to_string(payload)
            .map(WsMessage::Text)
            .map_err(|e| RedialError::Serialization(e.to_string()))
    }
}

impl<F> Serializer for F
where
    F: Fn(&Value) -> Result<WsMessage> + Send + Sync + 'static,
{
    fn serialize(&self, payload: &Value) -> Result<WsMessage> {
        self(payload)
    }
}
