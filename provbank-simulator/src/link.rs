//! Per-link impairment around a plugin's send path.
//!
//! The shaper is transparent to the plugin: it decides *whether* and *when*
//! a record is handed over, never touching the payload. Timing headers are
//! stamped before the shaper runs, so artificial delay shows up as measured
//! latency exactly like real network delay would.

use bytes::Bytes;
use tracing::trace;

use provbank_config::ImpairmentProfile;
use provbank_core::network::{
    Admission, BernoulliLoss, DelayModel, JitteredDelay, LossModel, NoDelay, NoLoss, TokenBucket,
};
use provbank_core::time::Clock;
use provbank_protocols::{ProtocolPlugin, SendAck};
use provbank_protocols::ProtocolError;

/// What happened to one record at this link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the plugin; carries the plugin's ack.
    Delivered(SendAck),
    /// Dropped by the loss model or the bandwidth cap before reaching the
    /// plugin. Surfaces as loss in the statistics, never as an error.
    Dropped,
}

/// Impairment pipeline for one logical link: loss decision, bandwidth
/// admission, jittered delay, then the real send.
pub struct LinkShaper {
    delay: Box<dyn DelayModel>,
    loss: Box<dyn LossModel>,
    bucket: Option<TokenBucket>,
}

impl LinkShaper {
    /// Builds the pipeline a profile describes. Seeded so two runs of the
    /// same scenario draw identical impairment sequences.
    pub fn from_profile(profile: &ImpairmentProfile, seed: u64, clock: &dyn Clock) -> Self {
        let delay: Box<dyn DelayModel> = if profile.latency_ms == 0 && profile.jitter_ms == 0 {
            Box::new(NoDelay)
        } else {
            Box::new(JitteredDelay::new(profile.latency_ms, profile.jitter_ms, seed))
        };
        let loss: Box<dyn LossModel> = if profile.loss_probability == 0.0 {
            Box::new(NoLoss)
        } else {
            Box::new(BernoulliLoss::new(profile.loss_probability, seed ^ 0x9e3779b9))
        };
        let bucket = profile
            .bandwidth_cap
            .map(|rate| TokenBucket::new(rate, profile.overflow, clock.now_us()));
        Self { delay, loss, bucket }
    }

    /// Unshaped pass-through.
    pub fn unimpaired() -> Self {
        Self {
            delay: Box::new(NoDelay),
            loss: Box::new(NoLoss),
            bucket: None,
        }
    }

    /// Runs one record through the pipeline and, if it survives, through the
    /// plugin. Fatal plugin errors propagate untouched.
    pub async fn send_through(
        &mut self,
        plugin: &mut (dyn ProtocolPlugin + Send),
        payload: Bytes,
        clock: &dyn Clock,
    ) -> Result<SendOutcome, ProtocolError> {
        if self.loss.should_drop() {
            trace!("record dropped by loss model");
            return Ok(SendOutcome::Dropped);
        }

        if let Some(bucket) = &mut self.bucket {
            match bucket.admit(payload.len(), clock.now_us()) {
                Admission::Ready => {}
                Admission::Drop => {
                    trace!("record dropped by bandwidth cap");
                    return Ok(SendOutcome::Dropped);
                }
                Admission::DelayFor(wait) => tokio::time::sleep(wait).await,
            }
        }

        let delay = self.delay.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        plugin.send_data(payload).await.map(SendOutcome::Delivered)
    }
}
