//! Packet loss models.
//!
//! Loss is decided independently per record (Bernoulli), matching the way
//! kernel-level emulators drop datagrams.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Trait for loss models.
pub trait LossModel: Send {
    /// Decides whether the next record is dropped.
    fn should_drop(&mut self) -> bool;
}

/// No-op model for lossless links.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoss;

impl LossModel for NoLoss {
    fn should_drop(&mut self) -> bool {
        false
    }
}

/// Independent drop decision per record at a fixed probability.
#[derive(Debug)]
pub struct BernoulliLoss {
    probability: f64,
    rng: SmallRng,
}

impl BernoulliLoss {
    /// # Panics
    ///
    /// Panics if `probability` is outside `[0.0, 1.0]`. The config layer
    /// validates the range before a run starts.
    pub fn new(probability: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&probability),
            "loss probability must be between 0.0 and 1.0"
        );
        Self {
            probability,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl LossModel for BernoulliLoss {
    fn should_drop(&mut self) -> bool {
        self.rng.random_bool(self.probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_loss_never_drops() {
        let mut model = NoLoss;
        assert!((0..100).all(|_| !model.should_drop()));
    }

    #[test]
    fn certain_loss_always_drops() {
        let mut model = BernoulliLoss::new(1.0, 1);
        assert!((0..100).all(|_| model.should_drop()));
    }

    #[test]
    fn drop_rate_tracks_probability() {
        let mut model = BernoulliLoss::new(0.5, 99);
        let iterations = 10_000;
        let drops = (0..iterations).filter(|_| model.should_drop()).count();
        let rate = drops as f64 / iterations as f64;
        assert!((rate - 0.5).abs() < 0.05);
    }

    #[test]
    #[should_panic]
    fn rejects_probability_above_one() {
        BernoulliLoss::new(1.5, 0);
    }
}
