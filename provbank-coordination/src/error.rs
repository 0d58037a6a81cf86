//! Coordination-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinationError {
    /// Not every expected node registered before the timeout. Whether this
    /// degrades or aborts the run is the orchestrator's policy call.
    #[error("registration timed out: {registered}/{expected} nodes registered")]
    RegistrationTimeout { expected: usize, registered: usize },

    #[error("control channel closed")]
    ChannelClosed,

    #[error("malformed control frame: {0}")]
    Frame(String),

    #[error("unexpected control message: expected {expected}, got {got}")]
    UnexpectedMessage { expected: &'static str, got: String },

    #[error("control-plane I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        CoordinationError::Frame(err.to_string())
    }
}
