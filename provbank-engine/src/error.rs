//! Engine-level errors: every run-fatal condition, attributed to the
//! component that caused it.

use thiserror::Error;
use tokio::task::JoinError;

use provbank_config::ConfigError;
use provbank_coordination::CoordinationError;
use provbank_core::NodeId;
use provbank_protocols::ProtocolError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("plugin '{protocol}' on node '{node}' failed: {source}")]
    Plugin {
        node: NodeId,
        protocol: String,
        #[source]
        source: ProtocolError,
    },

    #[error("{component} did not come up within {timeout_ms}ms")]
    StartTimeout {
        component: &'static str,
        timeout_ms: u64,
    },

    #[error("coordination failed: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("run '{0}' has no coordination section")]
    NotDistributed(String),

    #[error("task failed: {0}")]
    Join(#[from] JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Component identity surfaced in the failed run's report.
    pub fn component(&self) -> String {
        match self {
            EngineError::Plugin { node, protocol, .. } => format!("plugin:{protocol}@{node}"),
            EngineError::StartTimeout { component, .. } => (*component).to_string(),
            EngineError::Coordination(_) => "coordination".to_string(),
            EngineError::Config(_) | EngineError::NotDistributed(_) => "config".to_string(),
            EngineError::Join(_) => "engine".to_string(),
            EngineError::Io(_) => "io".to_string(),
        }
    }
}
