//! Multi-node coordination parameters.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// What the coordinator does when not every expected node registers before
/// the timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Start with the nodes that did register.
    #[default]
    Degrade,
    /// Fail the run.
    Abort,
}

/// Control-plane settings for a distributed run.
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Control-plane listen address, distinct from the data-plane port
    /// under test.
    pub listen_addr: SocketAddr,

    /// Sensor-emitting nodes the coordinator waits for before START.
    #[validate(range(min = 1, max = 1024))]
    pub expected_nodes: usize,

    #[serde(default = "default_register_timeout")]
    pub register_timeout_ms: u64,

    #[serde(default)]
    pub on_missing: RegistrationPolicy,

    /// Lead time between the START broadcast and the synchronized start
    /// instant, giving every node room to arm its emission loop.
    #[serde(default = "default_start_delay")]
    pub start_delay_ms: u64,

    /// Acceptable start-instant spread across nodes after offset correction.
    #[serde(default = "default_sync_tolerance")]
    pub sync_tolerance_ms: u64,

    /// How long after the nominal run end the coordinator keeps accepting
    /// STATUS/REPORT frames.
    #[serde(default = "default_report_grace")]
    pub report_grace_ms: u64,
}

fn default_register_timeout() -> u64 {
    10_000
}

fn default_start_delay() -> u64 {
    500
}

fn default_sync_tolerance() -> u64 {
    50
}

fn default_report_grace() -> u64 {
    2_000
}

impl CoordinationConfig {
    pub fn register_timeout(&self) -> Duration {
        Duration::from_millis(self.register_timeout_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn sync_tolerance(&self) -> Duration {
        Duration::from_millis(self.sync_tolerance_ms)
    }

    pub fn report_grace(&self) -> Duration {
        Duration::from_millis(self.report_grace_ms)
    }
}
