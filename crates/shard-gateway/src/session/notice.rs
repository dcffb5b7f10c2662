//! Connection lifecycle notices

use crate::error::GatewayError;
use std::fmt;
use std::sync::Arc;

/// Lifecycle change broadcast to [`Session::notices`](super::Session::notices) subscribers
///
/// Notices are not gateway events and never reach event handlers.
#[derive(Debug, Clone)]
pub enum ConnectionNotice {
    /// A fresh session was identified
    Connected { session_id: String },
    /// A previous session was resumed
    Resumed,
    /// The connection was lost or given up
    Disconnected { reason: String },
    /// A reconnect attempt failed; `fatal` means no further attempts are made
    ReconnectFailed {
        attempt: u32,
        error: Arc<GatewayError>,
        fatal: bool,
    },
    /// The session was closed by the caller
    Closed,
}

impl ConnectionNotice {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Resumed => "resumed",
            Self::Disconnected { .. } => "disconnected",
            Self::ReconnectFailed { .. } => "reconnect_failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { session_id } => write!(f, "connected (session {session_id})"),
            Self::Resumed => f.write_str("resumed"),
            Self::Disconnected { reason } => write!(f, "disconnected: {reason}"),
            Self::ReconnectFailed {
                attempt,
                error,
                fatal,
            } => {
                write!(f, "reconnect attempt {attempt} failed: {error}")?;
                if *fatal {
                    f.write_str(" (giving up)")?;
                }
                Ok(())
            }
            Self::Closed => f.write_str("closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandshakeError;

    #[test]
    fn test_display() {
        let notice = ConnectionNotice::ReconnectFailed {
            attempt: 3,
            error: Arc::new(HandshakeError::AuthenticationFailed.into()),
            fatal: true,
        };
        assert_eq!(
            notice.to_string(),
            "reconnect attempt 3 failed: Handshake failed: Authentication failed (giving up)"
        );
        assert_eq!(notice.name(), "reconnect_failed");
        assert_eq!(ConnectionNotice::Resumed.to_string(), "resumed");
    }
}
