//! Subprocess-backed plugin for natively compiled protocol binaries.
//!
//! The binaries run autonomously (passive mode): the server binary writes a
//! receipt log the aggregator reconstructs records from, and the client
//! binaries generate their own traffic. Children are owned resources —
//! spawned with `kill_on_drop` so no exit path, panicking or otherwise,
//! leaks a process — and an unexpected child exit is reported through
//! `is_alive` so the orchestrator fails the run instead of measuring a ghost.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use provbank_config::{Mode, ProtocolConfig};

use crate::plugin::{ClientHandle, ProtocolPlugin, SendAck, ServerHandle};
use crate::ProtocolError;

pub struct SubprocessPlugin {
    protocol_id: String,
    children: Vec<(String, Child)>,
}

impl SubprocessPlugin {
    pub fn new(protocol_id: impl Into<String>) -> Self {
        Self {
            protocol_id: protocol_id.into(),
            children: Vec::new(),
        }
    }

    fn spawn(&mut self, name: String, binary: &Path, args: &[String]) -> Result<(), ProtocolError> {
        let child = Command::new(binary)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    ProtocolError::Unavailable {
                        protocol: self.protocol_id.clone(),
                        reason: format!("{}: {e}", binary.display()),
                    }
                }
                _ => ProtocolError::Runtime {
                    protocol: self.protocol_id.clone(),
                    reason: format!("spawn {name}: {e}"),
                },
            })?;
        debug!("started {name} (pid {:?})", child.id());
        self.children.push((name, child));
        Ok(())
    }
}

#[async_trait]
impl ProtocolPlugin for SubprocessPlugin {
    fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    fn mode(&self) -> Mode {
        Mode::Passive
    }

    async fn start_server(&mut self, cfg: &ProtocolConfig) -> Result<ServerHandle, ProtocolError> {
        let binary = cfg
            .server_binary
            .as_deref()
            .ok_or_else(|| ProtocolError::Unavailable {
                protocol: self.protocol_id.clone(),
                reason: "no server binary configured".to_string(),
            })?;
        let mut args = vec![
            cfg.server_addr.ip().to_string(),
            cfg.server_addr.port().to_string(),
        ];
        if let Some(log) = &cfg.receipt_log {
            args.push(log.display().to_string());
        }
        self.spawn("server".to_string(), binary, &args)?;
        Ok(ServerHandle {
            receipt_log: cfg.receipt_log.clone(),
        })
    }

    async fn start_clients(&mut self, cfg: &ProtocolConfig) -> Result<ClientHandle, ProtocolError> {
        let binary = cfg
            .client_binary
            .as_deref()
            .ok_or_else(|| ProtocolError::Unavailable {
                protocol: self.protocol_id.clone(),
                reason: "no client binary configured".to_string(),
            })?;
        for index in 0..cfg.client_count {
            let args = vec![
                cfg.server_addr.ip().to_string(),
                cfg.server_addr.port().to_string(),
                index.to_string(),
            ];
            self.spawn(format!("client-{index}"), binary, &args)?;
        }
        info!("started {} client processes", cfg.client_count);
        Ok(ClientHandle {
            client_count: cfg.client_count,
        })
    }

    async fn send_data(&mut self, _payload: Bytes) -> Result<SendAck, ProtocolError> {
        // Autonomous binaries own their send timing; orchestrated sends are
        // an active-mode capability this plugin does not carry.
        Err(ProtocolError::Runtime {
            protocol: self.protocol_id.clone(),
            reason: "passive protocol does not accept orchestrated sends".to_string(),
        })
    }

    async fn stop(&mut self) -> Result<(), ProtocolError> {
        for (name, child) in &mut self.children {
            match child.try_wait() {
                Ok(Some(status)) => debug!("{name} already exited: {status}"),
                _ => {
                    if let Err(e) = child.start_kill() {
                        warn!("failed to kill {name}: {e}");
                    }
                    let _ = child.wait().await;
                }
            }
        }
        self.children.clear();
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.children
            .iter_mut()
            .all(|(_, child)| matches!(child.try_wait(), Ok(None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    fn cfg(server: Option<PathBuf>, client: Option<PathBuf>) -> ProtocolConfig {
        ProtocolConfig {
            protocol_id: "native-udp".into(),
            mode: Mode::Passive,
            server_addr: "127.0.0.1:5000".parse::<SocketAddr>().unwrap(),
            client_count: 2,
            server_binary: server,
            client_binary: client,
            receipt_log: None,
            start_timeout_ms: 1_000,
            send_timeout_ms: 100,
            drain_grace_ms: 10,
        }
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let mut plugin = SubprocessPlugin::new("native-udp");
        let err = plugin
            .start_server(&cfg(Some("/nonexistent/provbank_server".into()), None))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn unconfigured_binary_is_unavailable() {
        let mut plugin = SubprocessPlugin::new("native-udp");
        let err = plugin.start_server(&cfg(None, None)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn children_are_tracked_and_stopped() {
        let mut plugin = SubprocessPlugin::new("native-udp");
        let sleep_bin = PathBuf::from("/bin/sleep");
        plugin.spawn("server".into(), &sleep_bin, &["30".into()]).unwrap();
        plugin.spawn("client-0".into(), &sleep_bin, &["30".into()]).unwrap();
        assert!(plugin.is_alive());
        plugin.stop().await.unwrap();
        assert!(plugin.children.is_empty());
        plugin.stop().await.unwrap();
    }

    #[tokio::test]
    async fn exited_child_reports_dead() {
        let mut plugin = SubprocessPlugin::new("native-udp");
        plugin
            .spawn("server".into(), &PathBuf::from("/bin/true"), &[])
            .unwrap();
        let (_, child) = &mut plugin.children[0];
        let _ = child.wait().await;
        assert!(!plugin.is_alive());
        plugin.stop().await.unwrap();
    }

    #[tokio::test]
    async fn passive_plugin_rejects_orchestrated_send() {
        let mut plugin = SubprocessPlugin::new("native-udp");
        let err = plugin.send_data(Bytes::new()).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
