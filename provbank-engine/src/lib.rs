//! # Provbank Engine
//!
//! The orchestrator: owns the run lifecycle from plugin startup through
//! traffic driving, impairment and failure composition, metrics collection,
//! and teardown — locally or across a coordinated set of sensor nodes.

mod context;
mod error;
mod report;
mod runtime;

pub use context::{RunContext, RunState};
pub use error::EngineError;
pub use report::RunReport;
pub use runtime::{run_sensor_node, Orchestrator};

pub mod prelude {
    pub use crate::{EngineError, Orchestrator, RunContext, RunReport, RunState};
}
