//! # Provbank Configuration System
//!
//! Typed, validated run configuration for the bench. Scenario, impairment,
//! failure-schedule, and coordination structures arrive here already parsed
//! (file formats and schema live with the external front end); this crate is
//! where invalid combinations are rejected before a run exists — notably
//! overlapping failure events on the same target and out-of-range
//! probabilities.
//!
//! A `ScenarioRun` is immutable once a run begins: the orchestrator freezes
//! it behind an `Arc` and no mutation API exists.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

mod coordination;
mod error;
mod failure;
mod run;
mod scenario;

pub use coordination::{CoordinationConfig, RegistrationPolicy};
pub use error::ConfigError;
pub use failure::{FailureEvent, FailureKind, FailureSchedule, FailureTarget};
pub use run::{RunId, ScenarioRun};
pub use scenario::{
    ImpairmentMap, ImpairmentProfile, Mode, PatternSpec, ProtocolConfig, ScenarioSpec,
    SensorPopulation,
};
