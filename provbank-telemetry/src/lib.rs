//! # Provbank Telemetry
//!
//! Crate for logging and metrics exposition.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
