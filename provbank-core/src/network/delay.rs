//! Per-record delivery delay models.
//!
//! A delay is sampled independently for every record, so a jittered link
//! produces the uneven inter-arrival spacing real networks show rather than
//! a constant shift.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Trait for delay models.
pub trait DelayModel: Send {
    /// Samples the delivery delay for the next record.
    fn next_delay(&mut self) -> Duration;
}

/// No-op model for unimpaired links.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayModel for NoDelay {
    fn next_delay(&mut self) -> Duration {
        Duration::ZERO
    }
}

/// Constant delay on every record.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl DelayModel for FixedDelay {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }
}

/// Base delay plus uniform jitter in `[0, jitter_ms]`, drawn from a seeded
/// generator so a run's impairment sequence is reproducible.
#[derive(Debug)]
pub struct JitteredDelay {
    base: Duration,
    jitter_ms: u64,
    rng: SmallRng,
}

impl JitteredDelay {
    pub fn new(base_ms: u64, jitter_ms: u64, seed: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            jitter_ms,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl DelayModel for JitteredDelay {
    fn next_delay(&mut self) -> Duration {
        if self.jitter_ms == 0 {
            return self.base;
        }
        let jitter = self.rng.random_range(0..=self.jitter_ms);
        self.base + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_delay_is_zero() {
        assert_eq!(NoDelay.next_delay(), Duration::ZERO);
    }

    #[test]
    fn fixed_delay_is_constant() {
        let mut model = FixedDelay::new(25);
        assert_eq!(model.next_delay(), Duration::from_millis(25));
        assert_eq!(model.next_delay(), Duration::from_millis(25));
    }

    #[test]
    fn jittered_delay_stays_in_range() {
        let mut model = JitteredDelay::new(100, 50, 7);
        for _ in 0..1_000 {
            let d = model.next_delay();
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = JitteredDelay::new(0, 30, 42);
        let mut b = JitteredDelay::new(0, 30, 42);
        for _ in 0..100 {
            assert_eq!(a.next_delay(), b.next_delay());
        }
    }
}
