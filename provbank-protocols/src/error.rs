//! Plugin-level error taxonomy.
//!
//! `Unavailable`, `Bind`, and `Runtime` are fatal to the run and carry the
//! failing plugin's identity; `SendTimeout` is fatal only to the single
//! record and is absorbed into loss statistics by the orchestrator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The protocol implementation cannot run here (missing binary,
    /// missing library).
    #[error("protocol '{protocol}' unavailable: {reason}")]
    Unavailable { protocol: String, reason: String },

    /// Port or resource conflict while bringing up the receiving role.
    #[error("protocol '{protocol}' failed to bind {addr}: {source}")]
    Bind {
        protocol: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected termination or I/O failure mid-run.
    #[error("protocol '{protocol}' runtime failure: {reason}")]
    Runtime { protocol: String, reason: String },

    /// A single send exceeded its deadline. Counted as loss, never fatal.
    #[error("send timed out after {timeout_ms}ms")]
    SendTimeout { timeout_ms: u64 },
}

impl ProtocolError {
    /// Whether this error aborts the run (per-record timeouts do not).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProtocolError::SendTimeout { .. })
    }
}
