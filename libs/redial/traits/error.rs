use thiserror::Error;

/// Main error type for redial
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedialError {
    /// Command issued against a connection that cannot serve it
    /// (no socket established, or socket not open)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Missing or invalid configuration (e.g. no serializer for SEND)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Payload could not be turned into a wire frame
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Command type string could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Socket task is gone
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Channel receive error
    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

impl RedialError {
    /// Error returned when a command needs a socket and none was ever established
    pub(crate) fn not_initialized() -> Self {
        RedialError::InvalidState(
            "socket connection not initialized, dispatch CONNECT first".to_string(),
        )
    }
}

/// Result type for redial operations
pub type Result<T> = std::result::Result<T, RedialError>;
