//! The protocol plugin contract.
//!
//! Exactly four operations: `start_server`, `start_clients`, `send_data`,
//! `stop`. The orchestrator consults the explicit [`Mode`] tag to decide
//! whether it drives `send_data` for every generated record (active) or the
//! plugin produces its own traffic and is merely observed (passive) — the
//! mode is never inferred from which methods an implementation happens to
//! support.
//!
//! `stop` is the one operation the orchestrator treats as idempotent across
//! repeated calls: it runs on every exit path, including after failed
//! starts, and must release all sockets and subprocesses each time.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use provbank_config::{Mode, ProtocolConfig};

use crate::ProtocolError;

/// Acknowledgement for one active-mode send. `server_receipt_us` is the
/// receiving server's clock at receipt, the raw material for cross-clock
/// latency; protocols without receipt reporting return `None` and fall back
/// to out-of-band timestamping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendAck {
    pub server_receipt_us: Option<u64>,
}

/// Handle returned by `start_server`. Carries the observability surface the
/// metrics aggregator reconstructs records from when acks are not enough:
/// a receipt log written out-of-band by the serving side.
#[derive(Debug, Default)]
pub struct ServerHandle {
    pub receipt_log: Option<PathBuf>,
}

/// Handle returned by `start_clients`.
#[derive(Debug, Default)]
pub struct ClientHandle {
    pub client_count: u32,
}

/// Capability set implemented by every protocol under test, whether
/// in-process or wrapped around a natively compiled binary.
#[async_trait]
pub trait ProtocolPlugin: Send {
    /// Stable identifier used in reports and error attribution.
    fn protocol_id(&self) -> &str;

    /// Explicit traffic-mode tag consulted by the orchestrator.
    fn mode(&self) -> Mode;

    /// Brings up the receiving role. Non-blocking: returns once the server
    /// is accepting traffic.
    async fn start_server(&mut self, cfg: &ProtocolConfig) -> Result<ServerHandle, ProtocolError>;

    /// Brings up the sending role(s). In passive mode the started clients
    /// emit autonomously; in active mode they wait for `send_data`.
    async fn start_clients(&mut self, cfg: &ProtocolConfig) -> Result<ClientHandle, ProtocolError>;

    /// Sends one already-encoded record (active mode only). The payload
    /// arrives with its timing header prepended; plugins forward it
    /// untouched.
    async fn send_data(&mut self, payload: Bytes) -> Result<SendAck, ProtocolError>;

    /// Releases every resource. Idempotent: safe to call repeatedly and on
    /// error paths.
    async fn stop(&mut self) -> Result<(), ProtocolError>;

    /// Liveness probe; subprocess-backed plugins report child exit here so
    /// the orchestrator can fail the run instead of silently losing traffic.
    fn is_alive(&mut self) -> bool {
        true
    }
}
