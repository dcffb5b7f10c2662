//! Heartbeat controller
//!
//! Sends a heartbeat every `interval` (first beat immediately) and stops as soon as a
//! tick finds the previous beat unacknowledged. The caller decides what to do with a
//! missed acknowledgement; the controller never retries.

use crate::error::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Liveness bookkeeping for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatState {
    /// Whether the last heartbeat sent has been acknowledged
    pub acked: bool,
    pub last_sent: Option<DateTime<Utc>>,
    pub last_ack: Option<DateTime<Utc>>,
}

impl HeartbeatState {
    /// Fresh state for a new connection; counts as acknowledged so the first beat goes out
    #[must_use]
    pub fn new() -> Self {
        Self {
            acked: true,
            last_sent: None,
            last_ack: None,
        }
    }

    /// Record a heartbeat about to be written
    pub fn record_sent(&mut self, at: DateTime<Utc>) {
        self.acked = false;
        self.last_sent = Some(at);
    }

    /// Record an op 11 acknowledgement
    pub fn record_ack(&mut self, at: DateTime<Utc>) {
        self.acked = true;
        self.last_ack = Some(at);
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        let (sent, ack) = (self.last_sent?, self.last_ack?);
        (ack - sent).to_std().ok()
    }
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

/// What the heartbeat loop needs from a connection
#[async_trait]
pub trait HeartbeatLink: Send + Sync {
    /// Whether the previous heartbeat was acknowledged
    fn acknowledged(&self) -> bool;

    /// Write a heartbeat carrying the latest sequence, recording the send beforehand
    async fn beat(&self) -> Result<(), GatewayError>;
}

/// Why the heartbeat loop stopped
#[derive(Debug)]
pub enum HeartbeatExit {
    /// Connection or session was cancelled
    Cancelled,
    /// A tick found the previous heartbeat unacknowledged
    MissedAck,
    /// Writing a heartbeat failed
    SendFailed(GatewayError),
}

/// Run the heartbeat loop until cancellation, a missed ack, or a failed write
pub async fn run<L>(link: &L, interval: Duration, cancel: CancellationToken) -> HeartbeatExit
where
    L: HeartbeatLink + ?Sized,
{
    // `interval` panics on a zero period
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatExit::Cancelled,
            _ = ticker.tick() => {}
        }

        if !link.acknowledged() {
            tracing::warn!(
                interval_ms = interval.as_millis(),
                "Heartbeat not acknowledged"
            );
            return HeartbeatExit::MissedAck;
        }

        if let Err(e) = link.beat().await {
            tracing::warn!(error = %e, "Failed to send heartbeat");
            return HeartbeatExit::SendFailed(e);
        }
        tracing::trace!("Heartbeat sent");
    }
}
