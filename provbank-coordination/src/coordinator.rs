//! Coordinator endpoint.
//!
//! Accepts registrations from sensor nodes, probes each one's clock, and
//! serializes the START broadcast so every registered node observes the same
//! synchronized start instant. Report collection runs one reader task per
//! node feeding a single ingestion channel; the writers stay behind so STOP
//! can always be issued, on success and failure paths alike.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use provbank_config::{CoordinationConfig, RegistrationPolicy};
use provbank_core::time::{Clock, ClockOffset};
use provbank_core::NodeId;

use crate::framing::{Channel, ChannelWriter};
use crate::messages::ControlMessage;
use crate::CoordinationError;

/// A sensor node that completed registration and clock probing.
#[derive(Debug)]
pub struct RegisteredNode {
    pub node_id: NodeId,
    pub sensor_count: u32,
    pub offset: ClockOffset,
    pub channel: Channel,
}

pub struct Coordinator {
    listener: TcpListener,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    pub async fn bind(addr: SocketAddr, clock: Arc<dyn Clock>) -> Result<Self, CoordinationError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, clock })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CoordinationError> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for `expected_nodes` registrations. On timeout the run either
    /// proceeds with the nodes that made it (degraded) or aborts, per
    /// policy; zero registrations always abort.
    pub async fn collect_registrations(
        &mut self,
        cfg: &CoordinationConfig,
    ) -> Result<Vec<RegisteredNode>, CoordinationError> {
        let deadline = tokio::time::Instant::now() + cfg.register_timeout();
        let mut nodes: Vec<RegisteredNode> = Vec::with_capacity(cfg.expected_nodes);

        while nodes.len() < cfg.expected_nodes {
            let accepted = match tokio::time::timeout_at(deadline, self.listener.accept()).await {
                Err(_) => break,
                Ok(accepted) => accepted,
            };
            match accepted {
                Ok((stream, peer)) => match self.register_one(Channel::new(stream)).await {
                    Ok(node) => {
                        info!(
                            "node {} registered from {peer} ({} sensors, offset {}us ±{}us)",
                            node.node_id, node.sensor_count, node.offset.offset_us,
                            node.offset.error_bound_us
                        );
                        nodes.push(node);
                    }
                    Err(e) => warn!("registration from {peer} failed: {e}"),
                },
                Err(e) => warn!("accept failed: {e}"),
            }
        }

        if nodes.len() < cfg.expected_nodes {
            let registered = nodes.len();
            match cfg.on_missing {
                RegistrationPolicy::Abort => {
                    return Err(CoordinationError::RegistrationTimeout {
                        expected: cfg.expected_nodes,
                        registered,
                    })
                }
                RegistrationPolicy::Degrade if registered == 0 => {
                    return Err(CoordinationError::RegistrationTimeout {
                        expected: cfg.expected_nodes,
                        registered,
                    })
                }
                RegistrationPolicy::Degrade => {
                    warn!(
                        "proceeding degraded with {registered}/{} nodes",
                        cfg.expected_nodes
                    );
                }
            }
        }
        Ok(nodes)
    }

    /// REGISTER → PROBE → PROBE_REPLY → REGISTER_ACK handshake for one
    /// connection.
    async fn register_one(&self, mut channel: Channel) -> Result<RegisteredNode, CoordinationError> {
        let (node_id, sensor_count) = match channel.recv_required().await? {
            ControlMessage::Register { node_id, sensor_count } => (node_id, sensor_count),
            other => {
                return Err(CoordinationError::UnexpectedMessage {
                    expected: "register",
                    got: other.kind().to_string(),
                })
            }
        };

        let probe_sent_us = self.clock.now_us();
        channel
            .send(&ControlMessage::Probe {
                coordinator_send_us: probe_sent_us,
            })
            .await?;
        let node_time_us = match channel.recv_required().await? {
            ControlMessage::ProbeReply {
                coordinator_send_us,
                node_time_us,
            } if coordinator_send_us == probe_sent_us => node_time_us,
            other => {
                return Err(CoordinationError::UnexpectedMessage {
                    expected: "probe_reply",
                    got: other.kind().to_string(),
                })
            }
        };
        let probe_recv_us = self.clock.now_us();
        let offset = ClockOffset::estimate(probe_sent_us, node_time_us, probe_recv_us);

        channel
            .send(&ControlMessage::RegisterAck {
                clock_offset_us: offset.offset_us,
                error_bound_us: offset.error_bound_us,
            })
            .await?;

        Ok(RegisteredNode {
            node_id,
            sensor_count,
            offset,
            channel,
        })
    }
}

/// Serialized START broadcast: every node sees the same start instant.
pub async fn broadcast_start(
    nodes: &mut [RegisteredNode],
    scenario_id: &str,
    start_time_us: u64,
) -> Result<(), CoordinationError> {
    let message = ControlMessage::Start {
        scenario_id: scenario_id.to_string(),
        start_time_us,
    };
    for node in nodes.iter_mut() {
        node.channel.send(&message).await?;
    }
    info!("START broadcast to {} nodes (t={start_time_us}us)", nodes.len());
    Ok(())
}

/// Fan-in of STATUS/REPORT frames from all registered nodes.
pub struct ReportCollector {
    rx: mpsc::UnboundedReceiver<(NodeId, ControlMessage)>,
    writers: Vec<(NodeId, ChannelWriter)>,
    readers: Vec<JoinHandle<()>>,
}

impl ReportCollector {
    /// Moves each node's read half into a background task; writers stay
    /// here for the STOP broadcast.
    pub fn start(nodes: Vec<RegisteredNode>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut writers = Vec::with_capacity(nodes.len());
        let mut readers = Vec::with_capacity(nodes.len());
        for node in nodes {
            let (mut reader, writer) = node.channel.split();
            writers.push((node.node_id.clone(), writer));
            let tx = tx.clone();
            let node_id = node.node_id;
            readers.push(tokio::spawn(async move {
                loop {
                    match reader.recv().await {
                        Ok(Some(message)) => {
                            if tx.send((node_id.clone(), message)).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!("reader for {node_id} ended: {e}");
                            break;
                        }
                    }
                }
            }));
        }
        Self { rx, writers, readers }
    }

    /// Next frame from any node, or `None` once the deadline passes or all
    /// nodes hung up.
    pub async fn next_until(
        &mut self,
        deadline: tokio::time::Instant,
    ) -> Option<(NodeId, ControlMessage)> {
        tokio::time::timeout_at(deadline, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// STOP to every node that is still reachable. Issued on every exit
    /// path; per-node send failures are logged, not fatal.
    pub async fn broadcast_stop(&mut self) {
        for (node_id, writer) in &mut self.writers {
            if let Err(e) = writer.send(&ControlMessage::Stop).await {
                warn!("STOP to {node_id} failed: {e}");
            }
        }
    }

    /// Tears down reader tasks.
    pub fn shutdown(self) {
        for reader in self.readers {
            reader.abort();
        }
    }
}
