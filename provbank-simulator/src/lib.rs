//! # Provbank Simulator
//!
//! The controlled-degradation layer between the orchestrator and a protocol
//! plugin: per-link network impairment (delay, loss, bandwidth shaping) and
//! scheduled failure injection (link blackouts, node crashes, partitions).
//!
//! The two concerns are deliberately disjoint — the link shaper degrades
//! delivery of records that do flow, the failure injector decides whether a
//! path exists at all — so the orchestrator composes them without any
//! coordination between the two.

pub mod failure;
pub mod link;

pub use failure::{FailureAction, FailureInjector, TargetState};
pub use link::{LinkShaper, SendOutcome};
