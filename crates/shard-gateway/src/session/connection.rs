//! Per-connection machinery: handshake, read loop, heartbeat task

use super::state::{ConnectionState, Handshake, SessionState};
use super::{ConnectionNotice, Session, Writer};
use crate::error::{GatewayError, GatewayResult, HandshakeError, ProtocolError, TransportError};
use crate::events::Event;
use crate::heartbeat::{self, HeartbeatExit, HeartbeatLink, HeartbeatState};
use crate::protocol::{
    gateway_url_with_query, GatewayMessage, OpCode, ResumePayload, NORMAL_CLOSURE,
    RESUMABLE_CLOSURE,
};
use crate::transport::{self, Inbound, WsSource};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Why a connection ended
#[derive(Debug)]
pub(crate) enum Disconnect {
    /// Socket error, remote close, or end of stream
    Transport(GatewayError),
    /// Heartbeat not acknowledged within one interval
    MissedHeartbeat(Duration),
    /// Op 7
    ServerReconnect,
    /// Op 9
    InvalidSession { resumable: bool },
}

/// What to do about a lost connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// Reconnect and resume
    Resume,
    /// Reconnect with a fresh Identify
    Identify,
    /// Stay disconnected
    GiveUp,
    /// Stay disconnected; retrying cannot succeed
    Fatal,
}

impl Disconnect {
    fn recovery(&self, reconnect_on_error: bool) -> Recovery {
        match self {
            Self::Transport(e) if e.is_fatal() => Recovery::Fatal,
            Self::Transport(GatewayError::Handshake(HandshakeError::SessionInvalidated))
            | Self::InvalidSession { resumable: false } => Recovery::Identify,
            Self::Transport(GatewayError::Transport(TransportError::Closed {
                code: Some(_),
                ..
            }))
            | Self::MissedHeartbeat(_)
            | Self::ServerReconnect
            | Self::InvalidSession { resumable: true } => Recovery::Resume,
            Self::Transport(_) if reconnect_on_error => Recovery::Resume,
            Self::Transport(_) => Recovery::GiveUp,
        }
    }

    fn into_error(self) -> GatewayError {
        match self {
            Self::Transport(e) => e,
            Self::MissedHeartbeat(interval) => GatewayError::HeartbeatTimeout(interval),
            Self::ServerReconnect => TransportError::Closed {
                code: None,
                reason: "reconnect requested by gateway".to_string(),
            }
            .into(),
            Self::InvalidSession { resumable: false } => HandshakeError::SessionInvalidated.into(),
            Self::InvalidSession { resumable: true } => TransportError::Closed {
                code: None,
                reason: "session invalidated, resumable".to_string(),
            }
            .into(),
        }
    }
}

/// Error reported to a caller still waiting on the handshake
///
/// A missed heartbeat before READY is reported as a lost connection.
fn handshake_failure(error: GatewayError) -> GatewayError {
    match error {
        GatewayError::HeartbeatTimeout(interval) => TransportError::Closed {
            code: None,
            reason: format!("heartbeat not acknowledged within {interval:?} during handshake"),
        }
        .into(),
        other => other,
    }
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GatewayError::Closed),
        result = fut => result,
    }
}

impl Session {
    /// Open one connection and complete its handshake
    ///
    /// Expects the state to be `Connecting`. On failure the connection is torn down and
    /// the state is left for the caller to settle.
    pub(crate) async fn connect(&self, cancel: &CancellationToken) -> GatewayResult<Handshake> {
        let config = &self.inner.config;

        let (resume_url, cached_url) = {
            let state = self.inner.state.read();
            let resume_url = state
                .resume_gateway_url
                .clone()
                .filter(|_| state.can_resume());
            (resume_url, state.gateway_url.clone())
        };

        let url = match resume_url.or(cached_url) {
            Some(url) => url,
            None => {
                let url = cancellable(cancel, self.inner.locator.gateway_url()).await?;
                self.inner.state.write().gateway_url = Some(url.clone());
                url
            }
        };
        let url = gateway_url_with_query(&url);

        let (sink, mut source) = cancellable(cancel, async {
            transport::connect(&url, config.connect_timeout)
                .await
                .map_err(GatewayError::from)
        })
        .await?;
        let hello = cancellable(
            cancel,
            transport::await_hello(&mut source, config.handshake_timeout),
        )
        .await?;
        let interval = Duration::from_millis(hello.heartbeat_interval);

        let (tx, rx) = oneshot::channel();
        let (generation, connection, resume) = {
            let mut state = self.inner.state.write();
            if cancel.is_cancelled()
                || !state.transition(&[ConnectionState::Connecting], ConnectionState::Identifying)
            {
                return Err(GatewayError::Closed);
            }

            let resume = state.session_id.clone().map(|session_id| ResumePayload {
                token: config.token.clone(),
                session_id,
                seq: state.sequence.unwrap_or(0),
            });
            if resume.is_none() {
                state.invalidate();
            }

            state.generation += 1;
            state.heartbeat = HeartbeatState::new();
            state.ready = false;
            state.handshake = Some(tx);
            let connection = cancel.child_token();
            state.connection = Some(connection.clone());
            (state.generation, connection, resume)
        };

        tracing::debug!(
            generation,
            heartbeat_interval_ms = hello.heartbeat_interval,
            "Hello received"
        );

        *self.inner.writer.lock().await = Some(Writer { generation, sink });

        self.track(tokio::spawn(self.clone().read_loop(
            source,
            generation,
            connection.clone(),
        )));
        self.track(tokio::spawn(self.clone().heartbeat_loop(
            generation,
            interval,
            connection,
        )));

        let outcome = self.handshake(resume.as_ref(), rx, cancel).await;

        if let Err(e) = &outcome {
            let code = if e.is_fatal() {
                NORMAL_CLOSURE
            } else {
                RESUMABLE_CLOSURE
            };
            self.abandon_connection(generation, code).await;
        }
        outcome
    }

    /// Send Identify or Resume, then wait for READY or RESUMED
    async fn handshake(
        &self,
        resume: Option<&ResumePayload>,
        waiter: oneshot::Receiver<GatewayResult<Handshake>>,
        cancel: &CancellationToken,
    ) -> GatewayResult<Handshake> {
        let config = &self.inner.config;

        let message = match resume {
            Some(payload) => {
                tracing::info!(
                    session_id = %payload.session_id,
                    seq = payload.seq,
                    "Resuming gateway session"
                );
                GatewayMessage::resume(payload)?
            }
            None => {
                tracing::info!(shard_id = config.shard_id, "Identifying");
                GatewayMessage::identify(&config.identify_payload())?
            }
        };
        self.send(&message).await?;

        let timeout = config.handshake_timeout;
        let acknowledged = cancellable(cancel, async {
            tokio::time::timeout(timeout, waiter)
                .await
                .map_err(|_| GatewayError::from(HandshakeError::Timeout(timeout)))
        })
        .await?;

        match acknowledged {
            Ok(result) => result,
            Err(_) => Err(TransportError::Closed {
                code: None,
                reason: "connection lost during handshake".to_string(),
            }
            .into()),
        }
    }

    /// Tear down connection `generation`: stop its loops, drop its handshake waiter,
    /// and close its writer with `code`. No-op for any other generation.
    pub(crate) async fn abandon_connection(&self, generation: u64, code: u16) {
        let connection = {
            let mut state = self.inner.state.write();
            if state.generation != generation {
                return;
            }
            state.handshake = None;
            state.ready = false;
            state.connection.take()
        };
        if let Some(connection) = connection {
            connection.cancel();
        }

        let writer = {
            let mut writer = self.inner.writer.lock().await;
            match writer.as_ref() {
                Some(current) if current.generation == generation => writer.take(),
                _ => None,
            }
        };
        if let Some(writer) = writer {
            writer.close(code).await;
        }
    }

    async fn read_loop(self, mut source: WsSource, generation: u64, cancel: CancellationToken) {
        loop {
            let frame = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                frame = transport::next_frame(&mut source) => frame,
            };
            // A frame that raced with cancellation is dropped unhandled
            if cancel.is_cancelled() {
                break;
            }

            let lost = match frame {
                Ok(Inbound::Message(message)) => self.handle_message(generation, message).await,
                Ok(Inbound::Invalid(e)) => {
                    tracing::warn!(error = %e, "Ignoring invalid frame");
                    None
                }
                Ok(Inbound::Closed { code, reason }) => {
                    tracing::info!(code = ?code, reason = %reason, "Gateway closed the connection");
                    Some(Disconnect::Transport(transport::closed_error(code, reason)))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Gateway connection failed");
                    Some(Disconnect::Transport(e.into()))
                }
            };

            if let Some(reason) = lost {
                self.connection_lost(generation, reason).await;
                break;
            }
        }

        tracing::debug!(generation, "Read loop stopped");
    }

    async fn handle_message(&self, generation: u64, message: GatewayMessage) -> Option<Disconnect> {
        match message.op {
            OpCode::Dispatch => {
                self.handle_dispatch(generation, message);
                None
            }
            OpCode::Heartbeat => {
                tracing::debug!("Heartbeat requested by gateway");
                if let Err(e) = self.send_heartbeat(generation).await {
                    tracing::warn!(error = %e, "Failed to answer heartbeat request");
                }
                None
            }
            OpCode::HeartbeatAck => {
                let mut state = self.inner.state.write();
                if state.generation == generation {
                    state.heartbeat.record_ack(Utc::now());
                }
                None
            }
            OpCode::Reconnect => {
                tracing::info!("Gateway requested reconnect");
                Some(Disconnect::ServerReconnect)
            }
            OpCode::InvalidSession => {
                let resumable = message.as_invalid_session().unwrap_or(false);
                tracing::info!(resumable, "Session invalidated by gateway");
                Some(Disconnect::InvalidSession { resumable })
            }
            OpCode::Hello => None,
            op => {
                let err = ProtocolError::UnexpectedOpcode(op);
                tracing::warn!(error = %err, "Ignoring frame");
                None
            }
        }
    }

    fn handle_dispatch(&self, generation: u64, message: GatewayMessage) {
        let Some(name) = message.t else {
            tracing::warn!(seq = ?message.s, "Dispatch without event type");
            return;
        };

        {
            let mut state = self.inner.state.write();
            if state.generation != generation {
                return;
            }
            if let Some(seq) = message.s {
                if !state.record_sequence(seq) {
                    tracing::debug!(seq, event_type = %name, "Skipping replayed event");
                    return;
                }
            }
        }

        let event = match Event::decode(&name, message.d.unwrap_or(Value::Null)) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(event_type = %name, "Ignoring unknown event");
                return;
            }
            Err(source) => {
                let err = ProtocolError::Decode {
                    event: name,
                    source,
                };
                tracing::warn!(error = %err, "Dropping malformed event");
                return;
            }
        };

        let waiter = match &event {
            Event::Ready(ready) => {
                self.mark_ready(generation, Handshake::Identified, |state| {
                    state.session_id = Some(ready.session_id.clone());
                    state.resume_gateway_url.clone_from(&ready.resume_gateway_url);
                })
            }
            Event::Resumed(_) => self.mark_ready(generation, Handshake::Resumed, |_| {}),
            _ => None,
        };

        if self.inner.config.state_enabled {
            if let Some(tracker) = &self.inner.tracker {
                if catch_unwind(AssertUnwindSafe(|| tracker.update(&event))).is_err() {
                    tracing::error!(event_type = event.name(), "State tracker panicked");
                }
            }
        }

        self.inner.registry.dispatch(self, &event);

        // Handshake completes after READY/RESUMED handlers ran
        if let Some((waiter, handshake)) = waiter {
            let _ = waiter.send(Ok(handshake));
        }
    }

    fn mark_ready<F>(
        &self,
        generation: u64,
        handshake: Handshake,
        update: F,
    ) -> Option<(oneshot::Sender<GatewayResult<Handshake>>, Handshake)>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.inner.state.write();
        if state.generation != generation {
            return None;
        }

        update(&mut state);
        state.transition(&[ConnectionState::Identifying], ConnectionState::Connected);
        state.ready = true;
        state.handshake.take().map(|waiter| (waiter, handshake))
    }

    async fn heartbeat_loop(self, generation: u64, interval: Duration, cancel: CancellationToken) {
        let link = ConnectionLink {
            session: self.clone(),
            generation,
        };

        match heartbeat::run(&link, interval, cancel).await {
            HeartbeatExit::Cancelled => {}
            HeartbeatExit::MissedAck => {
                self.connection_lost(generation, Disconnect::MissedHeartbeat(interval))
                    .await;
            }
            HeartbeatExit::SendFailed(e) => {
                self.connection_lost(generation, Disconnect::Transport(e)).await;
            }
        }

        tracing::debug!(generation, "Heartbeat loop stopped");
    }

    /// React to the end of connection `generation`
    ///
    /// Stale generations and closed sessions are ignored. A pending handshake gets the
    /// error instead; the caller of `connect` decides what follows.
    pub(crate) async fn connection_lost(&self, generation: u64, reason: Disconnect) {
        let recovery = reason.recovery(self.inner.config.reconnect_on_error);
        let error = reason.into_error();

        let pending = {
            let mut state = self.inner.state.write();
            if state.generation != generation || state.status == ConnectionState::Closed {
                return;
            }
            if recovery == Recovery::Identify {
                state.invalidate();
            }
            state.handshake.take()
        };

        if let Some(pending) = pending {
            let _ = pending.send(Err(handshake_failure(error)));
            return;
        }

        match recovery {
            Recovery::Fatal | Recovery::GiveUp => {
                let stopped = self.inner.state.write().transition(
                    &[
                        ConnectionState::Connected,
                        ConnectionState::Identifying,
                        ConnectionState::Connecting,
                    ],
                    ConnectionState::Disconnected,
                );
                if !stopped {
                    return;
                }

                self.abandon_connection(generation, NORMAL_CLOSURE).await;
                let error = Arc::new(error);
                if recovery == Recovery::Fatal {
                    tracing::error!(error = %error, "Gateway rejected the session");
                    self.notify(ConnectionNotice::ReconnectFailed {
                        attempt: 0,
                        error: error.clone(),
                        fatal: true,
                    });
                } else {
                    tracing::warn!(error = %error, "Connection lost, not reconnecting");
                }
                self.notify(ConnectionNotice::Disconnected {
                    reason: error.to_string(),
                });
            }
            Recovery::Resume | Recovery::Identify => {
                let reconnecting = self
                    .inner
                    .state
                    .write()
                    .transition(&[ConnectionState::Connected], ConnectionState::Reconnecting);
                if !reconnecting {
                    return;
                }

                let resume = recovery == Recovery::Resume;
                let code = if resume {
                    RESUMABLE_CLOSURE
                } else {
                    NORMAL_CLOSURE
                };
                tracing::warn!(error = %error, resume, "Connection lost, reconnecting");

                let task = tokio::spawn(self.clone().reconnect(generation, code, error.to_string()));
                self.track(task);
            }
        }
    }
}

/// Heartbeat side of one connection
struct ConnectionLink {
    session: Session,
    generation: u64,
}

#[async_trait]
impl HeartbeatLink for ConnectionLink {
    fn acknowledged(&self) -> bool {
        self.session.inner.state.read().heartbeat.acked
    }

    async fn beat(&self) -> Result<(), GatewayError> {
        self.session.send_heartbeat(self.generation).await
    }
}
