//! Frame decoding and encoding

use crate::error::{GatewayError, GatewayResult, HandshakeError, ProtocolError, TransportError};
use crate::protocol::{CloseCode, GatewayMessage, HelloPayload};
use futures_util::{Stream, StreamExt};
use std::borrow::Cow;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};

/// One inbound frame, as seen by the read loop
#[derive(Debug)]
pub enum Inbound {
    /// Decoded gateway message
    Message(GatewayMessage),
    /// Frame that could not be interpreted; the connection stays usable
    Invalid(ProtocolError),
    /// Remote closed the connection, or the stream ended
    Closed { code: Option<u16>, reason: String },
}

/// Read the next gateway frame, skipping control frames
pub async fn next_frame<S>(source: &mut S) -> Result<Inbound, TransportError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let Some(message) = source.next().await else {
            return Ok(Inbound::Closed {
                code: None,
                reason: "stream ended".to_string(),
            });
        };

        return match message {
            Ok(Message::Text(text)) => Ok(match GatewayMessage::from_json(&text) {
                Ok(msg) => Inbound::Message(msg),
                Err(e) => Inbound::Invalid(ProtocolError::MalformedFrame(e)),
            }),
            Ok(Message::Binary(_)) => Ok(Inbound::Invalid(ProtocolError::BinaryFrame)),
            Ok(Message::Close(frame)) => Ok(match frame {
                Some(frame) => Inbound::Closed {
                    code: Some(u16::from(frame.code)),
                    reason: frame.reason.into_owned(),
                },
                None => Inbound::Closed {
                    code: None,
                    reason: String::new(),
                },
            }),
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                tracing::trace!("Control frame received");
                continue;
            }
            Err(e) => Err(TransportError::WebSocket(e)),
        };
    }
}

/// Wait for the Hello frame that opens every connection
pub async fn await_hello<S>(source: &mut S, timeout: Duration) -> GatewayResult<HelloPayload>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let inbound = tokio::time::timeout(timeout, next_frame(source))
        .await
        .map_err(|_| HandshakeError::Timeout(timeout))??;

    let hello = match inbound {
        Inbound::Message(msg) => msg
            .as_hello()
            .ok_or_else(|| HandshakeError::MissingHello(msg.op.to_string()))?,
        Inbound::Invalid(e) => return Err(e.into()),
        Inbound::Closed { code, reason } => return Err(closed_error(code, reason)),
    };

    if hello.heartbeat_interval == 0 {
        return Err(ProtocolError::InvalidHeartbeatInterval(hello.heartbeat_interval).into());
    }
    Ok(hello)
}

/// Map a remote close to the error the session reports for it
pub(crate) fn closed_error(code: Option<u16>, reason: String) -> GatewayError {
    match code
        .and_then(CloseCode::from_u16)
        .and_then(HandshakeError::from_close_code)
    {
        Some(handshake) => handshake.into(),
        None => TransportError::Closed { code, reason }.into(),
    }
}

/// Encode a gateway message as a text frame
pub fn text_message(msg: &GatewayMessage) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(msg.to_json()?))
}

/// Build a close frame
#[must_use]
pub fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: WsCloseCode::from(code),
        reason: Cow::Owned(reason.to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;
    use futures_util::stream;

    fn frames(
        messages: Vec<Message>,
    ) -> impl Stream<Item = Result<Message, tungstenite::Error>> + Unpin {
        stream::iter(messages.into_iter().map(Ok))
    }

    fn text(json: &str) -> Message {
        Message::Text(json.to_string())
    }

    #[tokio::test]
    async fn test_control_frames_are_skipped() {
        let mut source = frames(vec![
            Message::Ping(vec![1]),
            Message::Pong(vec![]),
            text(r#"{"op":11}"#),
        ]);

        match next_frame(&mut source).await.unwrap() {
            Inbound::Message(msg) => assert_eq!(msg.op, OpCode::HeartbeatAck),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_and_binary_frames_are_invalid() {
        let mut source = frames(vec![text("not json"), Message::Binary(vec![0x78, 0x9c])]);

        assert!(matches!(
            next_frame(&mut source).await.unwrap(),
            Inbound::Invalid(ProtocolError::MalformedFrame(_))
        ));
        assert!(matches!(
            next_frame(&mut source).await.unwrap(),
            Inbound::Invalid(ProtocolError::BinaryFrame)
        ));
    }

    #[tokio::test]
    async fn test_close_frame_carries_code() {
        let mut source = frames(vec![close_message(4004, "Authentication failed")]);

        match next_frame(&mut source).await.unwrap() {
            Inbound::Closed { code, reason } => {
                assert_eq!(code, Some(4004));
                assert_eq!(reason, "Authentication failed");
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        // Exhausted stream reads as a close without a code
        assert!(matches!(
            next_frame(&mut source).await.unwrap(),
            Inbound::Closed { code: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_await_hello() {
        let mut source = frames(vec![text(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#)]);
        let hello = await_hello(&mut source, Duration::from_secs(1)).await.unwrap();
        assert_eq!(hello.heartbeat_interval, 41_250);
    }

    #[tokio::test]
    async fn test_await_hello_rejects_zero_interval() {
        let mut source = frames(vec![text(r#"{"op":10,"d":{"heartbeat_interval":0}}"#)]);
        let err = await_hello(&mut source, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Protocol(ProtocolError::InvalidHeartbeatInterval(0))
        ));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_await_hello_rejects_other_frames() {
        let mut source = frames(vec![text(r#"{"op":11}"#)]);
        let err = await_hello(&mut source, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Handshake(HandshakeError::MissingHello(_))));
    }

    #[tokio::test]
    async fn test_await_hello_fatal_close() {
        let mut source = frames(vec![close_message(4004, "bad token")]);
        let err = await_hello(&mut source, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_hello_times_out() {
        let mut source = stream::pending::<Result<Message, tungstenite::Error>>();
        let err = await_hello(&mut source, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Handshake(HandshakeError::Timeout(_))));
    }

    #[test]
    fn test_closed_error_mapping() {
        assert!(matches!(
            closed_error(Some(4009), String::new()),
            GatewayError::Handshake(HandshakeError::SessionInvalidated)
        ));
        assert!(matches!(
            closed_error(Some(4000), String::new()),
            GatewayError::Transport(TransportError::Closed { code: Some(4000), .. })
        ));
        assert!(matches!(
            closed_error(None, String::new()),
            GatewayError::Transport(TransportError::Closed { code: None, .. })
        ));
    }
}
