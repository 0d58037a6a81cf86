//! ## provbank-core::network
//! **Network condition models**
//!
//! Building blocks for per-link impairment: delay (base latency plus
//! jitter), probabilistic loss, and token-bucket bandwidth shaping. Models
//! are deliberately independent of any transport; the simulator composes
//! them around a protocol plugin's send path.

pub mod bandwidth;
pub mod delay;
pub mod loss;

pub use bandwidth::{Admission, OverflowPolicy, TokenBucket};
pub use delay::{DelayModel, FixedDelay, JitteredDelay, NoDelay};
pub use loss::{BernoulliLoss, LossModel, NoLoss};
