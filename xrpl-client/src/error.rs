//! Error types for the ledger node client

use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to a ledger node
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Configuration sources could not be merged or extracted
    #[error("Configuration load failed: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Websocket dial or upgrade failed
    #[error("Dial failed for {url}: {reason}")]
    DialFailed {
        /// Endpoint that was dialled
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// Socket write failed or missed its deadline
    #[error("Write error: {0}")]
    Write(String),

    /// Socket read failed
    #[error("Read error: {0}")]
    Read(String),

    /// Peer closed the connection or the read deadline expired
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Outbound request could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// A request id was registered twice
    #[error("Duplicate request id: {0}")]
    DuplicateId(String),

    /// No reply arrived before the request deadline
    #[error("Request {id} timed out after {timeout:?}")]
    Timeout {
        /// Id of the abandoned request
        id: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// No connection epoch is currently live
    #[error("Client is not connected")]
    NotConnected,

    /// Another reconnect is already running
    #[error("Reconnect already in progress")]
    ReconnectInProgress,

    /// Client has been closed
    #[error("Client is closed")]
    Closed,
}

impl ClientError {
    /// Create a configuration validation error
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    /// Create a dial error
    pub fn dial_failed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::DialFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Create a read error
    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    /// Create a connection lost error
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::ConnectionLost(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

impl From<figment::Error> for ClientError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::dial_failed("ws://localhost:6006", "connection refused");
        assert_eq!(
            err.to_string(),
            "Dial failed for ws://localhost:6006: connection refused"
        );

        let err = ClientError::Timeout {
            id: "7".to_owned(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Request 7 timed out after 250ms");
    }
}
