//! ## provbank-core::time
//! **Clocks & cross-node offset estimation**
//!
//! Nodes in a distributed run are independently clocked; latency across them
//! is only meaningful after correcting for the relative clock offset. This
//! module provides the `Clock` abstraction shared by every component, a
//! deterministic virtual clock for tests, and the round-trip offset
//! estimator applied when merging cross-node timing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Microsecond time source. Implementations must be cheap to sample; the
/// codec calls [`Clock::now_us`] on every packet.
pub trait Clock: Send + Sync {
    /// Current time in microseconds since the Unix epoch (or a simulated
    /// equivalent).
    fn now_us(&self) -> u64;
}

/// Wall-clock time source used in real runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_micros() as u64
    }
}

/// A deterministic clock that advances only when told to.
///
/// Seedable, lock-free, and shared by cloning. Used by tests that need
/// reproducible timestamps without sleeping.
#[derive(Clone)]
pub struct VirtualClock {
    offset: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new(seed_us: u64) -> Self {
        Self {
            offset: Arc::new(AtomicU64::new(seed_us)),
        }
    }

    #[inline]
    pub fn advance_us(&self, us: u64) {
        self.offset.fetch_add(us, Ordering::Release);
    }
}

impl Clock for VirtualClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }
}

/// Wraps another clock with a fixed signed skew. Models a node whose clock
/// runs ahead of (positive) or behind (negative) the coordinator's.
pub struct SkewedClock<C> {
    inner: C,
    skew_us: i64,
}

impl<C: Clock> SkewedClock<C> {
    pub fn new(inner: C, skew_us: i64) -> Self {
        Self { inner, skew_us }
    }
}

impl<C: Clock> Clock for SkewedClock<C> {
    fn now_us(&self) -> u64 {
        self.inner.now_us().saturating_add_signed(self.skew_us)
    }
}

/// Estimated offset of a remote node's clock relative to the local
/// (coordinator) clock, from a single request/reply round trip.
///
/// `offset_us` is defined so that `remote_time + offset_us ≈ local_time`.
/// The estimate assumes a symmetric path; in the fully asymmetric worst case
/// it is wrong by at most half the round-trip time, which `error_bound_us`
/// reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockOffset {
    pub offset_us: i64,
    pub error_bound_us: u64,
}

impl ClockOffset {
    /// Estimates the offset from one probe: `local_send_us` and
    /// `local_recv_us` are sampled on the local clock around the round trip,
    /// `remote_us` is the remote clock sampled while answering.
    pub fn estimate(local_send_us: u64, remote_us: u64, local_recv_us: u64) -> Self {
        let rtt = local_recv_us.saturating_sub(local_send_us);
        let midpoint = local_send_us + rtt / 2;
        Self {
            offset_us: midpoint as i64 - remote_us as i64,
            error_bound_us: rtt / 2,
        }
    }

    /// Maps a remote-clock timestamp onto the local timebase.
    pub fn to_local(&self, remote_us: u64) -> u64 {
        remote_us.saturating_add_signed(self.offset_us)
    }
}
