//! Control-plane message vocabulary.
//!
//! Every frame is a single JSON object tagged with its type. Payload-bearing
//! frames carry the node identity so the coordinator can attribute them
//! without per-connection bookkeeping.

use serde::{Deserialize, Serialize};

use provbank_core::metrics::MetricRecord;
use provbank_core::NodeId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// First frame from a sensor node: who it is and how many sensors it
    /// contributes.
    Register { node_id: NodeId, sensor_count: u32 },

    /// Clock probe from the coordinator; `coordinator_send_us` echoes back
    /// in the reply so stale replies are detectable.
    Probe { coordinator_send_us: u64 },

    /// Node's answer, stamped with its local clock.
    ProbeReply {
        coordinator_send_us: u64,
        node_time_us: u64,
    },

    /// Registration accepted; carries the coordinator's offset estimate so
    /// the node can schedule against the coordinator's timebase.
    RegisterAck {
        clock_offset_us: i64,
        error_bound_us: u64,
    },

    /// Broadcast once all expected nodes registered (or the degraded subset
    /// was accepted). `start_time_us` is on the coordinator's clock; every
    /// node converts it with its own offset and begins emission together.
    Start {
        scenario_id: String,
        start_time_us: u64,
    },

    /// Periodic progress from a node.
    Status { node_id: NodeId, sent: u64 },

    /// Batch of per-packet records from a node. Ingestion is commutative,
    /// so report order across nodes is insignificant.
    Report {
        node_id: NodeId,
        records: Vec<MetricRecord>,
    },

    /// Tear down; sent on normal completion and on every failure path.
    Stop,
}

impl ControlMessage {
    /// Short name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Register { .. } => "register",
            ControlMessage::Probe { .. } => "probe",
            ControlMessage::ProbeReply { .. } => "probe_reply",
            ControlMessage::RegisterAck { .. } => "register_ack",
            ControlMessage::Start { .. } => "start",
            ControlMessage::Status { .. } => "status",
            ControlMessage::Report { .. } => "report",
            ControlMessage::Stop => "stop",
        }
    }
}
