//! In-memory reference plugin.
//!
//! The minimal plugin shape: the "server" is a decode step inside
//! `send_data`, acking with the server-side clock at receipt. Deterministic
//! and dependency-free, it is what orchestrator tests and new-plugin
//! authors start from.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use provbank_config::{Mode, ProtocolConfig};
use provbank_core::codec;
use provbank_core::time::Clock;

use crate::plugin::{ClientHandle, ProtocolPlugin, SendAck, ServerHandle};
use crate::ProtocolError;

pub struct LoopbackPlugin {
    clock: Arc<dyn Clock>,
    server_up: bool,
    clients_up: u32,
    /// Malformed payloads received; fatal to the record, not the run.
    pub malformed_received: u64,
}

impl LoopbackPlugin {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            server_up: false,
            clients_up: 0,
            malformed_received: 0,
        }
    }
}

#[async_trait]
impl ProtocolPlugin for LoopbackPlugin {
    fn protocol_id(&self) -> &str {
        "loopback"
    }

    fn mode(&self) -> Mode {
        Mode::Active
    }

    async fn start_server(&mut self, cfg: &ProtocolConfig) -> Result<ServerHandle, ProtocolError> {
        self.server_up = true;
        Ok(ServerHandle {
            receipt_log: cfg.receipt_log.clone(),
        })
    }

    async fn start_clients(&mut self, cfg: &ProtocolConfig) -> Result<ClientHandle, ProtocolError> {
        self.clients_up = cfg.client_count;
        Ok(ClientHandle {
            client_count: cfg.client_count,
        })
    }

    async fn send_data(&mut self, payload: Bytes) -> Result<SendAck, ProtocolError> {
        if !self.server_up {
            return Err(ProtocolError::Runtime {
                protocol: self.protocol_id().to_string(),
                reason: "send before start_server".to_string(),
            });
        }
        match codec::decode(&payload) {
            Ok(_) => Ok(SendAck {
                server_receipt_us: Some(self.clock.now_us()),
            }),
            Err(_) => {
                self.malformed_received += 1;
                Ok(SendAck::default())
            }
        }
    }

    async fn stop(&mut self) -> Result<(), ProtocolError> {
        self.server_up = false;
        self.clients_up = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provbank_core::time::VirtualClock;
    use std::net::SocketAddr;

    fn cfg() -> ProtocolConfig {
        ProtocolConfig {
            protocol_id: "loopback".into(),
            mode: Mode::Active,
            server_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            client_count: 2,
            server_binary: None,
            client_binary: None,
            receipt_log: None,
            start_timeout_ms: 1_000,
            send_timeout_ms: 100,
            drain_grace_ms: 10,
        }
    }

    #[tokio::test]
    async fn acks_with_server_clock() {
        let clock = Arc::new(VirtualClock::new(7_000));
        let mut plugin = LoopbackPlugin::new(clock.clone());
        plugin.start_server(&cfg()).await.unwrap();
        plugin.start_clients(&cfg()).await.unwrap();

        let (packet, _) = codec::stamp(0, b"{}", clock.as_ref());
        let ack = plugin.send_data(packet).await.unwrap();
        assert_eq!(ack.server_receipt_us, Some(7_000));
    }

    #[tokio::test]
    async fn malformed_payload_gets_no_receipt() {
        let clock = Arc::new(VirtualClock::new(0));
        let mut plugin = LoopbackPlugin::new(clock);
        plugin.start_server(&cfg()).await.unwrap();
        let ack = plugin.send_data(Bytes::from_static(b"short")).await.unwrap();
        assert_eq!(ack.server_receipt_us, None);
        assert_eq!(plugin.malformed_received, 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let clock = Arc::new(VirtualClock::new(0));
        let mut plugin = LoopbackPlugin::new(clock);
        plugin.start_server(&cfg()).await.unwrap();
        plugin.stop().await.unwrap();
        plugin.stop().await.unwrap();
        assert!(plugin.send_data(Bytes::new()).await.is_err());
    }
}
