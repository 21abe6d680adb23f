//! Outbound request throttle shared by every upstream call site.
//!
//! Fixed-interval gate: each permit reserves the next free slot
//! `1 / requests_per_second` after the previous one and the caller sleeps
//! until its slot arrives. The slot reservation sits behind a FIFO
//! `tokio::sync::Mutex`, so permits are handed out first-come-first-served
//! across all concurrent callers. A caller that is cancelled while waiting
//! keeps its reservation consumed.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Result, TrackerError};

/// Rate ceiling published by the upstream API (requests per second, per credential)
pub const UPSTREAM_RATE_CEILING: f64 = 4.0;

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` permits.
    ///
    /// The rate must be positive and strictly below [`UPSTREAM_RATE_CEILING`].
    pub fn new(requests_per_second: f64) -> Result<Self> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(TrackerError::Config(format!(
                "requests_per_second must be positive, got {}",
                requests_per_second
            )));
        }
        if requests_per_second >= UPSTREAM_RATE_CEILING {
            return Err(TrackerError::Config(format!(
                "requests_per_second must stay below the upstream ceiling of {}, got {}",
                UPSTREAM_RATE_CEILING, requests_per_second
            )));
        }

        Ok(Self::with_interval(Duration::from_secs_f64(
            1.0 / requests_per_second,
        )))
    }

    /// Create a limiter with an explicit spacing between permits
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until another outbound request fits under the configured rate.
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        if slot > Instant::now() {
            tracing::trace!("Rate limiter delaying request by {:?}", slot - Instant::now());
            tokio::time::sleep_until(slot).await;
        }
    }
}
