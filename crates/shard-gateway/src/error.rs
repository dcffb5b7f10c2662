//! Gateway error types

use crate::protocol::{CloseCode, OpCode};
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Gateway session error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connection could not be opened, failed, or closed unexpectedly
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Identify or Resume was rejected or never acknowledged
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Frame could not be interpreted
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Previous heartbeat was never acknowledged
    #[error("Heartbeat not acknowledged within {0:?}")]
    HeartbeatTimeout(Duration),

    /// A handler panicked; logged by the dispatcher, never returned to callers
    #[error("Handler panicked: {0}")]
    Handler(String),

    /// Gateway URL lookup failed
    #[error("Gateway lookup failed: {0}")]
    Locator(String),

    /// Invalid session configuration
    #[error("Configuration error: {0}")]
    Config(#[from] shard_common::ConfigError),

    /// `open` called on a session that is already open
    #[error("Session is already open")]
    AlreadyOpen,

    /// No connection to write to
    #[error("Session is not connected")]
    NotConnected,

    /// Session was closed by the caller
    #[error("Session is closed")]
    Closed,

    /// Handler registered under a name that is not a known event type
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Outbound payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether retrying the connection cannot succeed without a configuration change
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Handshake(e) => e.is_fatal(),
            Self::Config(_) | Self::Closed => true,
            _ => false,
        }
    }
}

impl From<tungstenite::Error> for GatewayError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Transport(TransportError::WebSocket(err))
    }
}

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Connection was not established in time
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Remote closed the connection
    #[error("Connection closed (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },
}

impl TransportError {
    /// Close code sent by the remote, if the connection was closed with one
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Closed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Handshake failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid shard")]
    InvalidShard,

    #[error("Sharding required")]
    ShardingRequired,

    #[error("Invalid API version")]
    InvalidApiVersion,

    #[error("Invalid intents")]
    InvalidIntents,

    #[error("Disallowed intents")]
    DisallowedIntents,

    /// Session can no longer be resumed; a fresh Identify is needed
    #[error("Session invalidated")]
    SessionInvalidated,

    /// READY or RESUMED not received in time
    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    /// First frame was not Hello
    #[error("Expected Hello, received {0}")]
    MissingHello(String),
}

impl HandshakeError {
    /// Map a fatal gateway close code to its handshake error
    #[must_use]
    pub fn from_close_code(code: CloseCode) -> Option<Self> {
        match code {
            CloseCode::AuthenticationFailed => Some(Self::AuthenticationFailed),
            CloseCode::InvalidShard => Some(Self::InvalidShard),
            CloseCode::ShardingRequired => Some(Self::ShardingRequired),
            CloseCode::InvalidApiVersion => Some(Self::InvalidApiVersion),
            CloseCode::InvalidIntents => Some(Self::InvalidIntents),
            CloseCode::DisallowedIntents => Some(Self::DisallowedIntents),
            CloseCode::InvalidSequence | CloseCode::SessionTimedOut => {
                Some(Self::SessionInvalidated)
            }
            _ => None,
        }
    }

    /// Credential, shard and intent rejections cannot be fixed by reconnecting
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::InvalidShard
                | Self::ShardingRequired
                | Self::InvalidApiVersion
                | Self::InvalidIntents
                | Self::DisallowedIntents
        )
    }
}

/// Frame interpretation failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not a valid gateway message
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    /// Known dispatch event whose payload has the wrong shape
    #[error("Failed to decode {event}: {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// Op code the client never expects to receive
    #[error("Unexpected op code {0}")]
    UnexpectedOpcode(OpCode),

    /// Binary frames (compressed transport) are not supported
    #[error("Binary frames are not supported")]
    BinaryFrame,

    /// Hello announced a heartbeat interval the client cannot keep
    #[error("Invalid heartbeat interval: {0} ms")]
    InvalidHeartbeatInterval(u64),
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
