//! Test helpers for integration tests
//!
//! A mock gateway that accepts WebSocket connections on a local port and runs a
//! script for each one. Every frame the client sends is recorded, tagged with the
//! index of the connection it arrived on.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use shard_gateway::protocol::{GatewayMessage, HelloPayload, OpCode};
use shard_gateway::{Session, SessionBuilder};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Default bound for waiting on asynchronous outcomes in tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame received by the mock gateway
#[derive(Debug, Clone)]
pub struct Received {
    pub connection: usize,
    pub message: GatewayMessage,
    /// When the mock gateway read the frame
    pub at: Instant,
}

#[derive(Debug, Default)]
struct Recorder {
    frames: Vec<Received>,
    /// `(connection, close code)` for every close frame received
    closes: Vec<(usize, Option<u16>)>,
    connections: usize,
}

/// One accepted connection, handed to the script
pub struct GatewayConn {
    pub index: usize,
    ws: WebSocketStream<TcpStream>,
    recorder: Arc<Mutex<Recorder>>,
    /// Answer client heartbeats with op 11
    pub auto_ack: bool,
}

impl GatewayConn {
    /// Send a gateway message
    pub async fn send(&mut self, message: &GatewayMessage) -> Result<()> {
        self.ws.send(Message::Text(message.to_json()?)).await?;
        Ok(())
    }

    /// Send Hello with the given heartbeat interval
    pub async fn hello(&mut self, interval_ms: u64) -> Result<()> {
        self.send(&GatewayMessage::hello(HelloPayload::with_interval(interval_ms)))
            .await
    }

    /// Send a dispatch event
    pub async fn dispatch(&mut self, event: &str, seq: u64, data: serde_json::Value) -> Result<()> {
        self.send(&GatewayMessage::dispatch(event, seq, data)).await
    }

    /// Receive the next gateway message; `None` once the client closes
    pub async fn recv(&mut self) -> Option<GatewayMessage> {
        while let Some(frame) = self.ws.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let message = GatewayMessage::from_json(&text).ok()?;
                    self.recorder.lock().frames.push(Received {
                        connection: self.index,
                        message: message.clone(),
                        at: Instant::now(),
                    });
                    return Some(message);
                }
                Ok(Message::Close(frame)) => {
                    let code = frame.map(|frame| u16::from(frame.code));
                    self.recorder.lock().closes.push((self.index, code));
                    return None;
                }
                Ok(_) => {}
                Err(_) => return None,
            }
        }
        None
    }

    /// Receive the next non-heartbeat message, acking heartbeats if `auto_ack`
    pub async fn recv_command(&mut self) -> Option<GatewayMessage> {
        loop {
            let message = self.recv().await?;
            if message.op != OpCode::Heartbeat {
                return Some(message);
            }
            if self.auto_ack && self.send(&GatewayMessage::heartbeat_ack()).await.is_err() {
                return None;
            }
        }
    }

    /// Wait for Identify or Resume
    pub async fn recv_handshake(&mut self) -> Result<GatewayMessage> {
        let message = tokio::time::timeout(TEST_TIMEOUT, self.recv_command())
            .await
            .map_err(|_| anyhow!("no handshake on connection {}", self.index))?
            .ok_or_else(|| anyhow!("connection {} closed before handshake", self.index))?;

        match message.op {
            OpCode::Identify | OpCode::Resume => Ok(message),
            other => bail!("expected Identify or Resume, received {other}"),
        }
    }

    /// Keep reading (acking heartbeats if `auto_ack`) until the client goes away
    pub async fn serve(mut self) -> Result<()> {
        while self.recv_command().await.is_some() {}
        Ok(())
    }

    /// Close the connection with `code`
    pub async fn close(mut self, code: u16) -> Result<()> {
        self.ws
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            }))
            .await?;
        // Drain until the client answers the close
        while self.ws.next().await.is_some() {}
        Ok(())
    }
}

/// Scripted gateway server
pub struct MockGateway {
    pub addr: SocketAddr,
    recorder: Arc<Mutex<Recorder>>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a gateway running `script` for every accepted connection
    pub async fn start<F, Fut>(script: F) -> Result<Self>
    where
        F: Fn(GatewayConn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let recorder = Arc::new(Mutex::new(Recorder::default()));

        let handle = {
            let recorder = recorder.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        continue;
                    };

                    let index = {
                        let mut recorder = recorder.lock();
                        recorder.connections += 1;
                        recorder.connections - 1
                    };
                    tracing::debug!(index, "Mock gateway accepted connection");

                    let run = script(GatewayConn {
                        index,
                        ws,
                        recorder: recorder.clone(),
                        auto_ack: true,
                    });
                    tokio::spawn(async move {
                        if let Err(e) = run.await {
                            tracing::warn!(index, error = %e, "Mock gateway script failed");
                        }
                    });
                }
            })
        };

        Ok(Self {
            addr,
            recorder,
            _handle: handle,
        })
    }

    /// URL the session should connect to
    pub fn url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Builder for a session pointed at this gateway, with fast reconnects
    pub fn session_builder(&self) -> SessionBuilder {
        Session::builder(crate::fixtures::TEST_TOKEN)
            .gateway_url(self.url())
            .connect_timeout(Duration::from_secs(2))
            .handshake_timeout(Duration::from_secs(2))
            .reconnect_delays(Duration::from_millis(10), Duration::from_millis(50))
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.recorder.lock().connections
    }

    /// Every frame received so far
    pub fn frames(&self) -> Vec<Received> {
        self.recorder.lock().frames.clone()
    }

    /// Frames with op `op`, in arrival order
    pub fn frames_with_op(&self, op: OpCode) -> Vec<Received> {
        self.frames()
            .into_iter()
            .filter(|received| received.message.op == op)
            .collect()
    }

    /// Close frames received, as `(connection, code)`
    pub fn closes(&self) -> Vec<(usize, Option<u16>)> {
        self.recorder.lock().closes.clone()
    }
}

/// Poll `condition` until it holds or [`TEST_TIMEOUT`] elapses
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + TEST_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
