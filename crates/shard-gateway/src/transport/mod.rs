//! WebSocket transport
//!
//! Opens the connection and turns raw WebSocket messages into gateway frames.
//! The socket is split into a writer half (owned by the session behind its write
//! lock) and a reader half (owned by the read loop).

mod frame;

pub use frame::{await_hello, close_message, next_frame, text_message, Inbound};
pub(crate) use frame::closed_error;

use crate::error::TransportError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Full duplex gateway socket
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Writer half of the socket
pub type WsSink = SplitSink<WsStream, Message>;

/// Reader half of the socket
pub type WsSource = SplitStream<WsStream>;

/// Open a WebSocket connection, bounded by `timeout`
pub async fn connect(url: &str, timeout: Duration) -> Result<(WsSink, WsSource), TransportError> {
    tracing::debug!(url = %url, timeout_ms = timeout.as_millis(), "Opening gateway connection");

    let (stream, response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url))
        .await
        .map_err(|_| TransportError::ConnectTimeout(timeout))??;

    tracing::debug!(status = %response.status(), "Gateway connection established");

    Ok(stream.split())
}
