//! UDP reference plugin.
//!
//! Datagram transport with the bench's timing header on every packet. The
//! server decodes each datagram on receipt and immediately acks with its own
//! clock (`sequence` + receipt time, reusing the header layout), which is
//! what gives active mode its per-record latency. Optionally the server also
//! writes a receipt log so passive reconstruction can be cross-checked
//! against live acks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use provbank_config::{Mode, ProtocolConfig};
use provbank_core::codec;
use provbank_core::time::Clock;

use crate::plugin::{ClientHandle, ProtocolPlugin, SendAck, ServerHandle};
use crate::ProtocolError;

const MAX_DATAGRAM: usize = 64 * 1024;

pub struct UdpPlugin {
    clock: Arc<dyn Clock>,
    server_task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
    client: Option<UdpSocket>,
    send_timeout: Duration,
}

impl UdpPlugin {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            server_task: None,
            shutdown: None,
            client: None,
            send_timeout: Duration::from_secs(1),
        }
    }

    async fn serve(
        socket: UdpSocket,
        clock: Arc<dyn Clock>,
        receipt_log: Option<PathBuf>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut receipts = Vec::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                incoming = socket.recv_from(&mut buf) => {
                    let (len, peer) = match incoming {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("udp server receive failed: {e}");
                            break;
                        }
                    };
                    let record = match codec::decode(&buf[..len]) {
                        Ok(record) => record,
                        Err(e) => {
                            // Fatal to this record only.
                            debug!("discarding malformed datagram: {e}");
                            continue;
                        }
                    };
                    let received_us = clock.now_us();
                    if receipt_log.is_some() {
                        receipts.push(format!(
                            "{} {} {}",
                            record.sequence, record.origin_timestamp_us, received_us
                        ));
                    }
                    let ack = codec::encode(record.sequence, received_us, &[]);
                    if let Err(e) = socket.send_to(&ack, peer).await {
                        warn!("udp ack to {peer} failed: {e}");
                    }
                }
            }
        }
        if let Some(path) = receipt_log {
            if let Err(e) = std::fs::write(&path, receipts.join("\n")) {
                warn!("failed to write receipt log {}: {e}", path.display());
            }
        }
    }
}

#[async_trait]
impl ProtocolPlugin for UdpPlugin {
    fn protocol_id(&self) -> &str {
        "udp"
    }

    fn mode(&self) -> Mode {
        Mode::Active
    }

    async fn start_server(&mut self, cfg: &ProtocolConfig) -> Result<ServerHandle, ProtocolError> {
        let socket = UdpSocket::bind(cfg.server_addr)
            .await
            .map_err(|source| ProtocolError::Bind {
                protocol: self.protocol_id().to_string(),
                addr: cfg.server_addr.to_string(),
                source,
            })?;
        debug!("udp server listening on {}", cfg.server_addr);

        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);
        self.server_task = Some(tokio::spawn(Self::serve(
            socket,
            self.clock.clone(),
            cfg.receipt_log.clone(),
            rx,
        )));
        Ok(ServerHandle {
            receipt_log: cfg.receipt_log.clone(),
        })
    }

    async fn start_clients(&mut self, cfg: &ProtocolConfig) -> Result<ClientHandle, ProtocolError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|source| ProtocolError::Bind {
                protocol: self.protocol_id().to_string(),
                addr: "0.0.0.0:0".to_string(),
                source,
            })?;
        socket
            .connect(cfg.server_addr)
            .await
            .map_err(|e| ProtocolError::Runtime {
                protocol: self.protocol_id().to_string(),
                reason: format!("connect to {}: {e}", cfg.server_addr),
            })?;
        self.client = Some(socket);
        self.send_timeout = cfg.send_timeout();
        Ok(ClientHandle {
            client_count: cfg.client_count,
        })
    }

    async fn send_data(&mut self, payload: Bytes) -> Result<SendAck, ProtocolError> {
        let socket = self.client.as_ref().ok_or_else(|| ProtocolError::Runtime {
            protocol: "udp".to_string(),
            reason: "send before start_clients".to_string(),
        })?;
        let sequence = codec::decode(&payload).ok().map(|r| r.sequence);
        socket
            .send(&payload)
            .await
            .map_err(|e| ProtocolError::Runtime {
                protocol: "udp".to_string(),
                reason: format!("send failed: {e}"),
            })?;

        // Wait for the matching ack; stale acks from timed-out sends are
        // drained and discarded.
        let mut buf = [0u8; codec::HEADER_LEN];
        let deadline = tokio::time::Instant::now() + self.send_timeout;
        loop {
            let received = tokio::time::timeout_at(deadline, socket.recv(&mut buf))
                .await
                .map_err(|_| ProtocolError::SendTimeout {
                    timeout_ms: self.send_timeout.as_millis() as u64,
                })?
                .map_err(|e| ProtocolError::Runtime {
                    protocol: "udp".to_string(),
                    reason: format!("ack receive failed: {e}"),
                })?;
            if let Ok(ack) = codec::decode(&buf[..received]) {
                if sequence.is_none() || sequence == Some(ack.sequence) {
                    return Ok(SendAck {
                        server_receipt_us: Some(ack.origin_timestamp_us),
                    });
                }
            }
        }
    }

    async fn stop(&mut self) -> Result<(), ProtocolError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.server_task.take() {
            let _ = task.await;
        }
        self.client = None;
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.server_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provbank_core::time::SystemClock;
    use std::net::SocketAddr;

    fn cfg(server_addr: SocketAddr) -> ProtocolConfig {
        ProtocolConfig {
            protocol_id: "udp".into(),
            mode: Mode::Active,
            server_addr,
            client_count: 1,
            server_binary: None,
            client_binary: None,
            receipt_log: None,
            start_timeout_ms: 1_000,
            send_timeout_ms: 1_000,
            drain_grace_ms: 10,
        }
    }

    async fn bound_plugin() -> (UdpPlugin, SocketAddr) {
        // Probe for a free port, then hand it to the plugin.
        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);
        (UdpPlugin::new(Arc::new(SystemClock)), addr)
    }

    #[tokio::test]
    async fn round_trip_produces_receipt() {
        let (mut plugin, addr) = bound_plugin().await;
        let cfg = cfg(addr);
        plugin.start_server(&cfg).await.unwrap();
        plugin.start_clients(&cfg).await.unwrap();

        let clock = SystemClock;
        let (packet, sent_us) = codec::stamp(9, b"{\"v\":1}", &clock);
        let ack = plugin.send_data(packet).await.unwrap();
        let receipt = ack.server_receipt_us.unwrap();
        assert!(receipt >= sent_us);
        plugin.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bind_conflict_is_a_bind_error() {
        let holder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = holder.local_addr().unwrap();
        let mut plugin = UdpPlugin::new(Arc::new(SystemClock));
        let err = plugin.start_server(&cfg(addr)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Bind { .. }));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // A bound socket that never acks: sends land, no receipt comes back.
        let mute = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = mute.local_addr().unwrap();
        let mut plugin = UdpPlugin::new(Arc::new(SystemClock));
        let mut cfg = cfg(addr);
        cfg.send_timeout_ms = 50;
        plugin.start_clients(&cfg).await.unwrap();
        let (packet, _) = codec::stamp(0, b"x", &SystemClock);
        let err = plugin.send_data(packet).await.unwrap_err();
        assert!(matches!(err, ProtocolError::SendTimeout { .. }));
        assert!(!err.is_fatal());
        plugin.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_twice_is_safe() {
        let (mut plugin, addr) = bound_plugin().await;
        let cfg = cfg(addr);
        plugin.start_server(&cfg).await.unwrap();
        plugin.stop().await.unwrap();
        plugin.stop().await.unwrap();
    }
}
