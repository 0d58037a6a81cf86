//! Scenario, impairment, and protocol configuration structures.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use provbank_core::network::OverflowPolicy;
use provbank_core::sensors::{EmissionPattern, SensorType};
use provbank_core::NodeId;

/// Whether the orchestrator drives every send (`Active`) or the plugin
/// generates its own traffic and is only observed (`Passive`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Active,
    Passive,
}

/// Emission pattern parameters as configured. Converted into the core
/// pattern once a run starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum PatternSpec {
    Periodic { interval_ms: u64 },
    Bursty {
        burst_rate: f64,
        idle_rate: f64,
        burst_secs: u64,
        idle_secs: u64,
    },
    Poisson { mean_rate: f64 },
}

impl PatternSpec {
    pub fn to_pattern(&self) -> EmissionPattern {
        match *self {
            PatternSpec::Periodic { interval_ms } => EmissionPattern::Periodic {
                interval: Duration::from_millis(interval_ms.max(1)),
            },
            PatternSpec::Bursty {
                burst_rate,
                idle_rate,
                burst_secs,
                idle_secs,
            } => EmissionPattern::Bursty {
                burst_rate,
                idle_rate,
                burst_len: Duration::from_secs(burst_secs),
                idle_len: Duration::from_secs(idle_secs),
            },
            PatternSpec::Poisson { mean_rate } => EmissionPattern::Poisson { mean_rate },
        }
    }
}

/// A homogeneous group of sensors on one node.
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct SensorPopulation {
    /// Node the population is sharded onto. Defaults to the local node.
    #[serde(default = "default_node")]
    pub node_id: NodeId,

    #[validate(range(min = 1, max = 1000000))]
    pub count: u32,

    pub sensor_type: SensorType,

    #[serde(flatten)]
    pub pattern: PatternSpec,
}

fn default_node() -> NodeId {
    NodeId::from("core")
}

/// Sensor workload description for one run.
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub scenario_id: String,

    #[validate(range(min = 1, max = 86400))]
    pub duration_secs: u64,

    /// Seed for traffic generation and impairment draws.
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[validate(nested)]
    pub populations: Vec<SensorPopulation>,
}

fn default_seed() -> u64 {
    42
}

impl ScenarioSpec {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn total_sensors(&self) -> u32 {
        self.populations.iter().map(|p| p.count).sum()
    }
}

/// Per-link network impairment. Applied per logical link (keyed by the
/// sending node's uplink), never globally, so topologies may be asymmetric.
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct ImpairmentProfile {
    #[serde(default)]
    pub latency_ms: u64,

    #[serde(default)]
    pub jitter_ms: u64,

    #[serde(default)]
    #[validate(custom(function = validate_probability))]
    pub loss_probability: f64,

    /// Aggregate byte-rate cap; `None` leaves the link unshaped.
    #[serde(default)]
    pub bandwidth_cap: Option<u64>,

    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for ImpairmentProfile {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            jitter_ms: 0,
            loss_probability: 0.0,
            bandwidth_cap: None,
            overflow: OverflowPolicy::Queue,
        }
    }
}

impl ImpairmentProfile {
    pub fn is_noop(&self) -> bool {
        self.latency_ms == 0
            && self.jitter_ms == 0
            && self.loss_probability == 0.0
            && self.bandwidth_cap.is_none()
    }
}

fn validate_probability(value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("probability_out_of_range"))
    }
}

/// Impairment keyed by link; links not listed fall back to `default`.
pub type ImpairmentMap = HashMap<String, ImpairmentProfile>;

/// Everything a protocol plugin needs to bring up its server and clients.
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub protocol_id: String,
    pub mode: Mode,
    pub server_addr: SocketAddr,

    #[serde(default = "default_clients")]
    pub client_count: u32,

    /// Native binaries for subprocess-backed plugins.
    #[serde(default)]
    pub server_binary: Option<PathBuf>,
    #[serde(default)]
    pub client_binary: Option<PathBuf>,

    /// Out-of-band receipt log written by passive protocols.
    #[serde(default)]
    pub receipt_log: Option<PathBuf>,

    #[serde(default = "default_start_timeout")]
    #[validate(range(min = 1))]
    pub start_timeout_ms: u64,

    #[serde(default = "default_send_timeout")]
    #[validate(range(min = 1))]
    pub send_timeout_ms: u64,

    /// How long to keep collecting late acks/reports after emission ends.
    #[serde(default = "default_drain_grace")]
    pub drain_grace_ms: u64,
}

fn default_clients() -> u32 {
    1
}

fn default_start_timeout() -> u64 {
    5_000
}

fn default_send_timeout() -> u64 {
    1_000
}

fn default_drain_grace() -> u64 {
    500
}

impl ProtocolConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(loss: f64) -> ImpairmentProfile {
        ImpairmentProfile {
            loss_probability: loss,
            ..ImpairmentProfile::default()
        }
    }

    #[test]
    fn probability_range_is_enforced() {
        assert!(profile(0.0).validate().is_ok());
        assert!(profile(1.0).validate().is_ok());
        assert!(profile(1.1).validate().is_err());
        assert!(profile(-0.1).validate().is_err());
    }

    #[test]
    fn default_profile_is_noop() {
        assert!(ImpairmentProfile::default().is_noop());
        assert!(!profile(0.5).is_noop());
    }

    #[test]
    fn pattern_spec_converts_to_core_pattern() {
        let spec = PatternSpec::Periodic { interval_ms: 100 };
        match spec.to_pattern() {
            EmissionPattern::Periodic { interval } => {
                assert_eq!(interval, Duration::from_millis(100));
            }
            other => panic!("unexpected pattern {other:?}"),
        }
    }
}
