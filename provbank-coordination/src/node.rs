//! Sensor-node endpoint.
//!
//! A node connects, registers its sensor shard, answers the coordinator's
//! clock probe with its local time, and learns its own offset from the ack.
//! START arrives on the coordinator's timebase; the node converts the start
//! instant into local time and parks until then, which is what lets every
//! shard begin emission together within the probe's error bound.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info};

use provbank_core::metrics::MetricRecord;
use provbank_core::time::{Clock, ClockOffset};
use provbank_core::NodeId;

use crate::framing::Channel;
use crate::messages::ControlMessage;
use crate::CoordinationError;

pub struct NodeSession {
    pub node_id: NodeId,
    /// This node's offset relative to the coordinator, as the coordinator
    /// estimated it: `node_time + offset = coordinator_time`.
    pub offset: ClockOffset,
    channel: Channel,
    clock: Arc<dyn Clock>,
}

impl NodeSession {
    /// Connects and completes the registration/probe handshake.
    pub async fn connect(
        addr: SocketAddr,
        node_id: NodeId,
        sensor_count: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoordinationError> {
        let mut channel = Channel::new(TcpStream::connect(addr).await?);
        channel
            .send(&ControlMessage::Register {
                node_id: node_id.clone(),
                sensor_count,
            })
            .await?;

        let echo = match channel.recv_required().await? {
            ControlMessage::Probe { coordinator_send_us } => coordinator_send_us,
            other => {
                return Err(CoordinationError::UnexpectedMessage {
                    expected: "probe",
                    got: other.kind().to_string(),
                })
            }
        };
        channel
            .send(&ControlMessage::ProbeReply {
                coordinator_send_us: echo,
                node_time_us: clock.now_us(),
            })
            .await?;

        let offset = match channel.recv_required().await? {
            ControlMessage::RegisterAck {
                clock_offset_us,
                error_bound_us,
            } => ClockOffset {
                offset_us: clock_offset_us,
                error_bound_us,
            },
            other => {
                return Err(CoordinationError::UnexpectedMessage {
                    expected: "register_ack",
                    got: other.kind().to_string(),
                })
            }
        };
        info!("node {node_id} registered (offset {}us)", offset.offset_us);

        Ok(Self {
            node_id,
            offset,
            channel,
            clock,
        })
    }

    /// Blocks until START, returning the scenario id and the start instant
    /// on the coordinator's clock.
    pub async fn await_start(
        &mut self,
        timeout: Duration,
    ) -> Result<(String, u64), CoordinationError> {
        let message = tokio::time::timeout(timeout, self.channel.recv_required())
            .await
            .map_err(|_| CoordinationError::ChannelClosed)??;
        match message {
            ControlMessage::Start {
                scenario_id,
                start_time_us,
            } => Ok((scenario_id, start_time_us)),
            other => Err(CoordinationError::UnexpectedMessage {
                expected: "start",
                got: other.kind().to_string(),
            }),
        }
    }

    /// Converts a coordinator-clock instant into this node's clock.
    pub fn to_local_us(&self, coordinator_us: u64) -> u64 {
        coordinator_us.saturating_add_signed(-self.offset.offset_us)
    }

    /// Parks until the local clock reaches `local_deadline_us`.
    pub async fn wait_until(&self, local_deadline_us: u64) {
        let now = self.clock.now_us();
        if local_deadline_us > now {
            tokio::time::sleep(Duration::from_micros(local_deadline_us - now)).await;
        }
        debug!("node {} releasing at {}us", self.node_id, self.clock.now_us());
    }

    pub async fn send_status(&mut self, sent: u64) -> Result<(), CoordinationError> {
        self.channel
            .send(&ControlMessage::Status {
                node_id: self.node_id.clone(),
                sent,
            })
            .await
    }

    pub async fn send_report(
        &mut self,
        records: Vec<MetricRecord>,
    ) -> Result<(), CoordinationError> {
        self.channel
            .send(&ControlMessage::Report {
                node_id: self.node_id.clone(),
                records,
            })
            .await
    }

    /// Waits for the coordinator's STOP (or channel close).
    pub async fn await_stop(&mut self, timeout: Duration) -> Result<(), CoordinationError> {
        match tokio::time::timeout(timeout, self.channel.recv()).await {
            Err(_) => Ok(()),
            Ok(Ok(None)) => Ok(()),
            Ok(Ok(Some(ControlMessage::Stop))) => Ok(()),
            Ok(Ok(Some(other))) => Err(CoordinationError::UnexpectedMessage {
                expected: "stop",
                got: other.kind().to_string(),
            }),
            Ok(Err(e)) => Err(e),
        }
    }
}
