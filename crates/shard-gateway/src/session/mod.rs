//! Gateway session
//!
//! A [`Session`] owns one shard's connection to the gateway: it opens the socket,
//! performs the Identify/Resume handshake, keeps the connection alive with
//! heartbeats, dispatches events to registered handlers, and reconnects when the
//! connection is lost. `Session` is a cheap handle; clones share the same state.
//!
//! Locks: session state (`parking_lot::RwLock`), handler registry (its own
//! `RwLock`), and the writer (`tokio::sync::Mutex`, held across the socket write).
//! No parking_lot guard is ever held across an await.

mod builder;
mod connection;
mod notice;
mod reconnect;
mod state;

pub use builder::{SessionBuilder, SessionConfig};
pub use notice::ConnectionNotice;
pub use state::ConnectionState;

use crate::collaborators::{GatewayLocator, StateTracker};
use crate::dispatcher::{HandlerKey, HandlerRegistry, HandlerToken};
use crate::error::{GatewayError, GatewayResult, HandshakeError};
use crate::events::{Event, EventPayload};
use crate::protocol::{
    GatewayMessage, PresenceUpdatePayload, RequestGuildMembersPayload, NORMAL_CLOSURE,
};
use crate::ratelimit::RateLimiter;
use crate::transport::{self, WsSink};
use chrono::{DateTime, Utc};
use futures_util::SinkExt;
use parking_lot::{Mutex, RwLock};
use state::{Handshake, SessionState};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const NOTICE_CAPACITY: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Writer half of the current connection
struct Writer {
    generation: u64,
    sink: WsSink,
}

impl Writer {
    /// Send a close frame and shut the sink down, bounded by [`CLOSE_TIMEOUT`]
    async fn close(mut self, code: u16) {
        let shutdown = async {
            self.sink
                .send(transport::close_message(code, ""))
                .await?;
            self.sink.close().await
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, shutdown).await {
            Ok(Ok(())) => tracing::debug!(code, "Connection closed"),
            Ok(Err(e)) => tracing::debug!(code, error = %e, "Close frame not delivered"),
            Err(_) => tracing::debug!(code, "Timed out closing connection"),
        }
    }
}

struct SessionInner {
    config: SessionConfig,
    locator: Arc<dyn GatewayLocator>,
    tracker: Option<Arc<dyn StateTracker>>,
    state: RwLock<SessionState>,
    registry: HandlerRegistry<Session>,
    writer: tokio::sync::Mutex<Option<Writer>>,
    limiter: RateLimiter,
    notices: broadcast::Sender<ConnectionNotice>,
    /// Session-wide cancellation; replaced when a closed session is reopened
    cancel: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes `open` and `close`
    lifecycle: tokio::sync::Mutex<()>,
}

/// Handle to one gateway session (one shard)
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Start building a session for `token`
    pub fn builder(token: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(token)
    }

    pub(crate) fn from_parts(
        config: SessionConfig,
        locator: Arc<dyn GatewayLocator>,
        tracker: Option<Arc<dyn StateTracker>>,
        limiter: RateLimiter,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            inner: Arc::new(SessionInner {
                config,
                locator,
                tracker,
                state: RwLock::new(SessionState::default()),
                registry: HandlerRegistry::new(),
                writer: tokio::sync::Mutex::new(None),
                limiter,
                notices,
                cancel: Mutex::new(CancellationToken::new()),
                tasks: Mutex::new(Vec::new()),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Connect and complete the handshake
    ///
    /// Identifies when there is no session to resume, resumes otherwise. Returns once
    /// READY or RESUMED has been processed, or with the error that ended the attempt.
    pub async fn open(&self) -> GatewayResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let opened = self.inner.state.write().transition(
            &[ConnectionState::Disconnected, ConnectionState::Closed],
            ConnectionState::Connecting,
        );
        if !opened {
            return Err(GatewayError::AlreadyOpen);
        }

        let cancel = {
            let mut cancel = self.inner.cancel.lock();
            if cancel.is_cancelled() {
                *cancel = CancellationToken::new();
            }
            cancel.clone()
        };

        tracing::info!(
            shard_id = self.inner.config.shard_id,
            shard_count = self.inner.config.shard_count,
            "Opening gateway session"
        );

        let mut retried = false;
        loop {
            match self.connect(&cancel).await {
                Ok(handshake) => {
                    self.announce(handshake);
                    return Ok(());
                }
                // Resume rejected; the session id is already gone, so this identifies
                Err(GatewayError::Handshake(HandshakeError::SessionInvalidated))
                    if !retried && !cancel.is_cancelled() =>
                {
                    retried = true;
                    let retry = self.inner.state.write().transition(
                        &[ConnectionState::Connecting, ConnectionState::Identifying],
                        ConnectionState::Connecting,
                    );
                    if !retry {
                        return Err(GatewayError::Closed);
                    }
                    tracing::info!("Resume rejected, identifying");
                }
                Err(e) => {
                    self.inner.state.write().transition(
                        &[
                            ConnectionState::Connecting,
                            ConnectionState::Identifying,
                            ConnectionState::Connected,
                        ],
                        ConnectionState::Disconnected,
                    );
                    tracing::warn!(error = %e, "Failed to open gateway session");
                    return Err(e);
                }
            }
        }
    }

    /// Close the session
    ///
    /// Stops every running task, sends a normal closure, and waits for the tasks to
    /// finish. No handler runs once this returns. Closing a closed session is a no-op.
    pub async fn close(&self) -> GatewayResult<()> {
        // Unblocks an `open` still waiting on its handshake
        self.session_token().cancel();
        let _lifecycle = self.inner.lifecycle.lock().await;

        let (connection, pending) = {
            let mut state = self.inner.state.write();
            if state.status == ConnectionState::Closed {
                return Ok(());
            }
            let current = state.status;
            state.transition(&[current], ConnectionState::Closed);
            state.ready = false;
            // A normal closure ends the session remotely too
            state.invalidate();
            (state.connection.take(), state.handshake.take())
        };

        if let Some(pending) = pending {
            let _ = pending.send(Err(GatewayError::Closed));
        }
        if let Some(connection) = connection {
            connection.cancel();
        }

        let writer = self.inner.writer.lock().await.take();
        if let Some(writer) = writer {
            writer.close(NORMAL_CLOSURE).await;
        }

        self.join_tasks().await;

        tracing::info!(shard_id = self.inner.config.shard_id, "Gateway session closed");
        self.notify(ConnectionNotice::Closed);
        Ok(())
    }

    /// Write a frame to the gateway
    ///
    /// Waits for rate-limit budget first, then for the writer. Writes never overlap.
    pub async fn send(&self, message: &GatewayMessage) -> GatewayResult<()> {
        self.ensure_not_closed()?;
        self.inner.limiter.acquire().await;

        let frame = transport::text_message(message)?;
        let mut writer = self.inner.writer.lock().await;
        let writer = writer.as_mut().ok_or(GatewayError::NotConnected)?;
        writer.sink.send(frame).await?;

        tracing::trace!(op = %message.op, "Frame sent");
        Ok(())
    }

    /// Send a heartbeat on connection `generation`, carrying the latest sequence
    pub(crate) async fn send_heartbeat(&self, generation: u64) -> GatewayResult<()> {
        self.ensure_not_closed()?;
        self.inner.limiter.acquire().await;

        let mut writer = self.inner.writer.lock().await;
        let writer = writer
            .as_mut()
            .filter(|writer| writer.generation == generation)
            .ok_or(GatewayError::NotConnected)?;

        // Read under the writer lock so the beat carries the newest sequence
        let sequence = {
            let mut state = self.inner.state.write();
            state.heartbeat.record_sent(Utc::now());
            state.sequence
        };

        let frame = transport::text_message(&GatewayMessage::heartbeat(sequence))?;
        writer.sink.send(frame).await?;

        tracing::trace!(seq = ?sequence, "Heartbeat sent");
        Ok(())
    }

    /// Register `callback` under an event type name, or `"*"` for every event
    pub fn add_handler<F>(&self, event: &str, callback: F, once: bool) -> GatewayResult<HandlerToken>
    where
        F: Fn(&Session, &Event) + Send + Sync + 'static,
    {
        let key = HandlerKey::parse(event)
            .ok_or_else(|| GatewayError::UnknownEventType(event.to_string()))?;
        Ok(self.inner.registry.register(key, once, callback))
    }

    /// Register a persistent handler for payload type `E`
    pub fn on<E, F>(&self, callback: F) -> HandlerToken
    where
        E: EventPayload,
        F: Fn(&Session, &E) + Send + Sync + 'static,
    {
        self.inner.registry.register_typed(false, callback)
    }

    /// Register a handler for payload type `E` that fires at most once
    pub fn once<E, F>(&self, callback: F) -> HandlerToken
    where
        E: EventPayload,
        F: Fn(&Session, &E) + Send + Sync + 'static,
    {
        self.inner.registry.register_typed(true, callback)
    }

    /// Register a persistent handler for every event
    pub fn on_any<F>(&self, callback: F) -> HandlerToken
    where
        F: Fn(&Session, &Event) + Send + Sync + 'static,
    {
        self.inner.registry.register(HandlerKey::Any, false, callback)
    }

    /// Update the presence of the current user (op 3)
    pub async fn update_status(&self, presence: &PresenceUpdatePayload) -> GatewayResult<()> {
        self.send(&GatewayMessage::presence_update(presence)?).await
    }

    /// Ask for guild members; they arrive as GUILD_MEMBERS_CHUNK events (op 8)
    pub async fn request_guild_members(
        &self,
        request: &RequestGuildMembersPayload,
    ) -> GatewayResult<()> {
        self.send(&GatewayMessage::request_guild_members(request)?).await
    }

    /// Subscribe to connection lifecycle notices
    pub fn notices(&self) -> broadcast::Receiver<ConnectionNotice> {
        self.inner.notices.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.read().status
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.state.read().session_id.clone()
    }

    /// Last dispatch sequence number seen
    pub fn sequence(&self) -> Option<u64> {
        self.inner.state.read().sequence
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connected, with READY or RESUMED processed on the current connection
    pub fn data_ready(&self) -> bool {
        let state = self.inner.state.read();
        state.status == ConnectionState::Connected && state.ready
    }

    /// `(shard_id, shard_count)`
    pub fn shard(&self) -> (u32, u32) {
        (self.inner.config.shard_id, self.inner.config.shard_count)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn heartbeat_latency(&self) -> Option<Duration> {
        self.inner.state.read().heartbeat.latency()
    }

    pub fn last_heartbeat_sent(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().heartbeat.last_sent
    }

    pub fn last_heartbeat_ack(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().heartbeat.last_ack
    }

    fn ensure_not_closed(&self) -> GatewayResult<()> {
        if self.state() == ConnectionState::Closed {
            return Err(GatewayError::Closed);
        }
        Ok(())
    }

    fn session_token(&self) -> CancellationToken {
        self.inner.cancel.lock().clone()
    }

    fn notify(&self, notice: ConnectionNotice) {
        tracing::debug!(notice = notice.name(), "Connection notice");
        // No subscribers is fine
        let _ = self.inner.notices.send(notice);
    }

    /// Report a completed handshake
    fn announce(&self, handshake: Handshake) {
        match handshake {
            Handshake::Identified => {
                let session_id = self.session_id().unwrap_or_default();
                tracing::info!(
                    shard_id = self.inner.config.shard_id,
                    session_id = %session_id,
                    "Gateway session ready"
                );
                self.notify(ConnectionNotice::Connected { session_id });
            }
            Handshake::Resumed => {
                tracing::info!(
                    shard_id = self.inner.config.shard_id,
                    seq = ?self.sequence(),
                    "Gateway session resumed"
                );
                self.notify(ConnectionNotice::Resumed);
            }
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Wait for every tracked task, including ones spawned while waiting
    async fn join_tasks(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    if e.is_panic() {
                        tracing::error!(error = %e, "Session task panicked");
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Session")
            .field("shard_id", &self.inner.config.shard_id)
            .field("shard_count", &self.inner.config.shard_count)
            .field("status", &state.status)
            .field("session_id", &state.session_id)
            .field("sequence", &state.sequence)
            .finish_non_exhaustive()
    }
}
