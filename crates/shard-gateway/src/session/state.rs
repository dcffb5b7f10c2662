//! Session state machine

use crate::error::GatewayResult;
use crate::heartbeat::HeartbeatState;
use std::fmt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Connection status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected; `open` may be called
    #[default]
    Disconnected,
    /// Opening the transport and waiting for Hello
    Connecting,
    /// Identify or Resume sent, waiting for READY or RESUMED
    Identifying,
    /// Handshake acknowledged
    Connected,
    /// Connection lost, a reconnect attempt is in progress
    Reconnecting,
    /// Closed by the caller
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Whether `open` is allowed from this state
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }

    /// Whether moving to `next` is a legal transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected | Self::Closed | Self::Reconnecting, Self::Connecting)
                | (Self::Connecting, Self::Identifying)
                | (Self::Identifying, Self::Connecting)
                | (Self::Identifying, Self::Connected)
                | (Self::Connected, Self::Reconnecting)
                | (Self::Connecting | Self::Identifying, Self::Reconnecting)
                | (
                    Self::Connecting
                        | Self::Identifying
                        | Self::Connected
                        | Self::Reconnecting,
                    Self::Disconnected
                )
                | (_, Self::Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a handshake was acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handshake {
    /// READY after Identify
    Identified,
    /// RESUMED after Resume
    Resumed,
}

/// Mutable session state, guarded by the session state lock
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) status: ConnectionState,
    /// Last sequence number seen while the session id is valid
    pub(crate) sequence: Option<u64>,
    /// Assigned by READY, used for Resume
    pub(crate) session_id: Option<String>,
    pub(crate) resume_gateway_url: Option<String>,
    /// Resolved gateway URL, cached after the first lookup
    pub(crate) gateway_url: Option<String>,
    pub(crate) heartbeat: HeartbeatState,
    /// READY or RESUMED processed on the current connection
    pub(crate) ready: bool,
    /// Incremented for every connection attempt; stale loops compare against it
    pub(crate) generation: u64,
    /// Cancels the current connection's read and heartbeat loops
    pub(crate) connection: Option<CancellationToken>,
    /// Resolved by the read loop once the handshake completes or fails
    pub(crate) handshake: Option<oneshot::Sender<GatewayResult<Handshake>>>,
}

impl SessionState {
    /// Move to `next` only if the current status is one of `from`
    pub(crate) fn transition(&mut self, from: &[ConnectionState], next: ConnectionState) -> bool {
        if !from.contains(&self.status) || !self.status.can_transition_to(next) {
            return false;
        }

        tracing::debug!(from = %self.status, to = %next, "Session state transition");
        self.status = next;
        true
    }

    /// Record a dispatch sequence number
    ///
    /// Returns `false` for a sequence already seen, which is then left unchanged.
    pub(crate) fn record_sequence(&mut self, seq: u64) -> bool {
        match self.sequence {
            Some(current) if seq <= current => false,
            _ => {
                self.sequence = Some(seq);
                true
            }
        }
    }

    /// Whether a Resume can be attempted
    pub(crate) fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    /// Drop the session id and sequence; the next handshake is a fresh Identify
    pub(crate) fn invalidate(&mut self) {
        if self.session_id.is_some() {
            tracing::debug!("Session invalidated");
        }
        self.session_id = None;
        self.sequence = None;
        self.resume_gateway_url = None;
    }
}
