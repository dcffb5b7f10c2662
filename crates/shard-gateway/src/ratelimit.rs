//! Outbound frame rate limiter
//!
//! Fixed-window token bucket: `capacity` frames per `interval`, refilled in full when
//! the window elapses. Callers over budget sleep until the next refill.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Default number of frames per window
pub const DEFAULT_CAPACITY: u32 = 120;

/// Default window length
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Bucket {
    remaining: u32,
    reset_at: Instant,
}

/// Token bucket gating outbound writes
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    interval: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter allowing `capacity` frames per `interval`
    ///
    /// A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: u32, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            interval,
            bucket: Mutex::new(Bucket {
                remaining: capacity,
                reset_at: Instant::now() + interval,
            }),
        }
    }

    /// Frames allowed per window
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Window length
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take one token, sleeping until the next refill if the bucket is empty
    pub async fn acquire(&self) {
        loop {
            let wait_until = match self.take() {
                Ok(()) => return,
                Err(reset_at) => reset_at,
            };

            tracing::debug!(
                wait_ms = wait_until.saturating_duration_since(Instant::now()).as_millis(),
                "Outbound rate limit reached, waiting for refill"
            );
            tokio::time::sleep_until(wait_until).await;
        }
    }

    /// Take one token without waiting
    ///
    /// Returns `false` when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        self.take().is_ok()
    }

    /// Tokens left in the current window
    pub fn remaining(&self) -> u32 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.remaining
    }

    fn take(&self) -> Result<(), Instant> {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());

        if bucket.remaining > 0 {
            bucket.remaining -= 1;
            Ok(())
        } else {
            Err(bucket.reset_at)
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        if now >= bucket.reset_at {
            bucket.remaining = self.capacity;
            bucket.reset_at = now + self.interval;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_INTERVAL)
    }
}
