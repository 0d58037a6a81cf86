//! Failure schedule configuration.
//!
//! A schedule is an ordered sequence of failure events relative to run
//! start. Events may overlap on different targets; overlap on the same
//! target is a configuration error caught here, so the injector never has
//! to arbitrate two active events on one target at runtime.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use provbank_core::NodeId;

use crate::ConfigError;

/// What the event does to its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Drop every packet on the target link for the duration.
    PacketLoss,
    /// Terminate the target node; it is not restarted for the rest of the
    /// run even after the event's nominal duration.
    NodeCrash,
    /// Sever all communication across the target uplink for the duration.
    Partition,
}

/// The node or link an event applies to. In the bench's star topology each
/// sensor node has exactly one uplink, so a link is named after it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureTarget {
    Node(NodeId),
    Link(String),
}

impl FailureTarget {
    /// Whether this target blocks traffic originating at `node`.
    pub fn covers(&self, node: &NodeId) -> bool {
        match self {
            FailureTarget::Node(n) => n == node,
            FailureTarget::Link(l) => l == node.as_str(),
        }
    }
}

impl fmt::Display for FailureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureTarget::Node(n) => write!(f, "node:{n}"),
            FailureTarget::Link(l) => write!(f, "link:{l}"),
        }
    }
}

/// One scheduled failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub kind: FailureKind,
    pub target: FailureTarget,
    pub start_offset: Duration,
    pub duration: Duration,
}

impl FailureEvent {
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.duration
    }
}

/// Validated, start-ordered sequence of failure events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FailureEvent>", into = "Vec<FailureEvent>")]
pub struct FailureSchedule {
    events: Vec<FailureEvent>,
}

impl FailureSchedule {
    /// Builds a schedule, rejecting overlapping events on the same target.
    pub fn new(mut events: Vec<FailureEvent>) -> Result<Self, ConfigError> {
        events.sort_by_key(|e| e.start_offset);
        // Sorted by start, so per target only the previous event can clash.
        let mut last_per_target: std::collections::HashMap<&FailureTarget, &FailureEvent> =
            std::collections::HashMap::new();
        for event in &events {
            if let Some(prev) = last_per_target.insert(&event.target, event) {
                if event.start_offset < prev.end_offset() {
                    return Err(ConfigError::OverlappingFailures {
                        target: event.target.to_string(),
                        first_ms: prev.start_offset.as_millis() as u64,
                        second_ms: event.start_offset.as_millis() as u64,
                    });
                }
            }
        }
        Ok(Self { events })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[FailureEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl TryFrom<Vec<FailureEvent>> for FailureSchedule {
    type Error = ConfigError;

    fn try_from(events: Vec<FailureEvent>) -> Result<Self, Self::Error> {
        Self::new(events)
    }
}

impl From<FailureSchedule> for Vec<FailureEvent> {
    fn from(schedule: FailureSchedule) -> Self {
        schedule.events
    }
}
