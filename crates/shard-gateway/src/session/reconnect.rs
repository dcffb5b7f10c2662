//! Reconnect loop with exponential backoff

use super::state::ConnectionState;
use super::{ConnectionNotice, Session};
use futures_util::future::{BoxFuture, FutureExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Delay before reconnect attempt `attempt` (1-based)
///
/// The first attempt is immediate. Later attempts double from `min` up to `max`, with
/// jitter picking a point in the upper half of the window.
pub(crate) fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }

    let exponent = (attempt - 2).min(16);
    let delay = min.saturating_mul(1 << exponent).min(max);
    if delay.is_zero() {
        return delay;
    }

    let half = delay / 2;
    half + rand::thread_rng().gen_range(Duration::ZERO..=delay - half)
}

impl Session {
    /// Replace connection `generation` until a handshake succeeds, the gateway rejects
    /// the session for good, or the session is closed
    ///
    /// Boxed because a successful attempt spawns the read loop that may spawn this again.
    pub(crate) fn reconnect(self, generation: u64, close_code: u16, reason: String) -> BoxFuture<'static, ()> {
        async move {
            self.notify(ConnectionNotice::Disconnected { reason });
            self.abandon_connection(generation, close_code).await;

            let cancel = self.session_token();
            let config = &self.inner.config;
            let mut attempt = 0u32;

            loop {
                attempt = attempt.saturating_add(1);

                let delay = backoff_delay(
                    attempt,
                    config.reconnect_min_delay,
                    config.reconnect_max_delay,
                );
                if !delay.is_zero() {
                    tracing::debug!(attempt, delay_ms = delay.as_millis(), "Waiting to reconnect");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        () = tokio::time::sleep(delay) => {}
                    }
                }

                let started = self
                    .inner
                    .state
                    .write()
                    .transition(&[ConnectionState::Reconnecting], ConnectionState::Connecting);
                if !started {
                    return;
                }

                tracing::info!(attempt, shard_id = config.shard_id, "Reconnecting");

                match self.connect(&cancel).await {
                    Ok(handshake) => {
                        self.announce(handshake);
                        return;
                    }
                    Err(e) => {
                        if cancel.is_cancelled() {
                            return;
                        }

                        let fatal = e.is_fatal();
                        let settled = self.inner.state.write().transition(
                            &[
                                ConnectionState::Connecting,
                                ConnectionState::Identifying,
                                ConnectionState::Connected,
                            ],
                            if fatal {
                                ConnectionState::Disconnected
                            } else {
                                ConnectionState::Reconnecting
                            },
                        );
                        if !settled {
                            return;
                        }

                        let error = Arc::new(e);
                        if fatal {
                            tracing::error!(attempt, error = %error, "Gateway rejected the session");
                        } else {
                            tracing::warn!(attempt, error = %error, "Reconnect attempt failed");
                        }
                        self.notify(ConnectionNotice::ReconnectFailed {
                            attempt,
                            error: error.clone(),
                            fatal,
                        });

                        if fatal {
                            self.notify(ConnectionNotice::Disconnected {
                                reason: error.to_string(),
                            });
                            return;
                        }
                    }
                }
            }
        }
        .boxed()
    }
}
