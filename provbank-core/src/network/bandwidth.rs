//! Token-bucket bandwidth shaping.
//!
//! Caps the aggregate bytes/sec a link may carry. Records within the burst
//! allowance pass immediately; excess records are either delayed until
//! enough tokens accrue or dropped, per the configured overflow policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to a record that exceeds the bucket's current allowance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Delay the record until tokens accrue.
    #[default]
    Queue,
    /// Drop the record outright.
    Drop,
}

/// Admission decision for one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Record fits the current allowance.
    Ready,
    /// Record admitted after the given delay (queue policy).
    DelayFor(Duration),
    /// Record rejected (drop policy).
    Drop,
}

/// Byte-rate limiter. Tokens refill continuously at `rate` bytes/sec up to
/// one second's worth of burst capacity.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill_us: u64,
    policy: OverflowPolicy,
}

impl TokenBucket {
    pub fn new(rate_bytes_per_sec: u64, policy: OverflowPolicy, now_us: u64) -> Self {
        let rate = rate_bytes_per_sec.max(1) as f64;
        Self {
            rate,
            capacity: rate,
            tokens: rate,
            last_refill_us: now_us,
            policy,
        }
    }

    fn refill(&mut self, now_us: u64) {
        let elapsed_us = now_us.saturating_sub(self.last_refill_us);
        self.last_refill_us = now_us;
        self.tokens = (self.tokens + self.rate * elapsed_us as f64 / 1_000_000.0).min(self.capacity);
    }

    /// Decides how a record of `len` bytes is admitted at `now_us`.
    ///
    /// With the queue policy the caller is expected to wait out the returned
    /// delay; tokens are debited immediately either way so consecutive
    /// oversized records queue behind each other rather than stacking on the
    /// same deficit.
    pub fn admit(&mut self, len: usize, now_us: u64) -> Admission {
        self.refill(now_us);
        let cost = len as f64;
        if self.tokens >= cost {
            self.tokens -= cost;
            return Admission::Ready;
        }
        match self.policy {
            OverflowPolicy::Drop => Admission::Drop,
            OverflowPolicy::Queue => {
                let deficit = cost - self.tokens;
                self.tokens -= cost;
                let wait_us = (deficit / self.rate * 1_000_000.0).ceil() as u64;
                Admission::DelayFor(Duration::from_micros(wait_us))
            }
        }
    }
}
