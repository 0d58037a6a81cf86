//! # provbank-core
//!
//! Foundation layer for the Provbank protocol bench: the wire-level timing
//! header, clock abstractions with cross-node offset estimation, the
//! multi-sensor traffic generator, network condition models, and the metrics
//! aggregator.
//!
//! ### Key Submodules:
//! - `codec`: fixed-layout timing header prepended to every measured packet
//! - `time`: `Clock` trait, system/virtual clocks, round-trip offset probes
//! - `sensors`: due-time multiplexed emission streams over sensor sessions
//! - `network`: delay/loss/bandwidth models applied per logical link
//! - `metrics`: per-packet record aggregation into run statistics

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod codec;
pub mod metrics;
pub mod network;
pub mod sensors;
pub mod time;

pub mod prelude {
    pub use crate::codec::*;
    pub use crate::metrics::*;
    pub use crate::network::*;
    pub use crate::sensors::*;
    pub use crate::time::*;
    pub use crate::NodeId;
}

/// Short identifier for a node participating in a run, either the
/// coordinator or one sensor-emitting node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
