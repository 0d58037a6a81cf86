//! Scheduled failure injection.
//!
//! Each target walks `Healthy → Degraded(event) → Healthy` as run time
//! passes its events' windows. The injector only ever sees a schedule the
//! config layer already validated, so at most one event is active per target
//! at any offset and no runtime arbitration exists.
//!
//! Crash semantics: a `NodeCrash` terminates its target and the target is
//! *not* restarted when the event's nominal duration ends — resilience under
//! unrecovered failure is the thing being measured. Link-level events
//! (`PacketLoss`, `Partition`) restore nominal behavior at expiry.

use std::time::Duration;

use tracing::warn;

use provbank_config::{FailureEvent, FailureKind, FailureSchedule};
use provbank_core::NodeId;

/// Failure injector verdict for one target at one offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetState {
    Healthy,
    Degraded(FailureKind),
}

/// Side effect the orchestrator must apply when an event fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureAction {
    /// Terminate the node's process(es) now; do not restart.
    TerminateNode(NodeId),
}

struct Armed {
    event: FailureEvent,
    fired: bool,
}

/// Replays a validated schedule against run-relative offsets.
pub struct FailureInjector {
    events: Vec<Armed>,
}

impl FailureInjector {
    pub fn new(schedule: &FailureSchedule) -> Self {
        Self {
            events: schedule
                .events()
                .iter()
                .cloned()
                .map(|event| Armed { event, fired: false })
                .collect(),
        }
    }

    fn window_active(event: &FailureEvent, offset: Duration) -> bool {
        match event.kind {
            // Crashed targets stay down for the rest of the run.
            FailureKind::NodeCrash => offset >= event.start_offset,
            FailureKind::PacketLoss | FailureKind::Partition => {
                offset >= event.start_offset && offset < event.end_offset()
            }
        }
    }

    /// State of the path originating at `node` at the given run offset.
    pub fn state_of(&self, node: &NodeId, offset: Duration) -> TargetState {
        self.events
            .iter()
            .find(|armed| armed.event.target.covers(node) && Self::window_active(&armed.event, offset))
            .map(|armed| TargetState::Degraded(armed.event.kind))
            .unwrap_or(TargetState::Healthy)
    }

    /// Whether records originating at `node` are swallowed at this offset,
    /// by any kind of active event on its path.
    pub fn is_blackholed(&self, node: &NodeId, offset: Duration) -> bool {
        matches!(self.state_of(node, offset), TargetState::Degraded(_))
    }

    /// Returns the actions for events whose start has been reached, once
    /// each. The orchestrator applies them (e.g. killing a node's
    /// subprocesses) and never reverses them.
    pub fn drain_due(&mut self, offset: Duration) -> Vec<FailureAction> {
        let mut actions = Vec::new();
        for armed in &mut self.events {
            if armed.fired || offset < armed.event.start_offset {
                continue;
            }
            armed.fired = true;
            if armed.event.kind == FailureKind::NodeCrash {
                if let provbank_config::FailureTarget::Node(node) = &armed.event.target {
                    warn!("injecting crash on node {node}");
                    actions.push(FailureAction::TerminateNode(node.clone()));
                }
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provbank_config::FailureTarget;

    fn schedule(events: Vec<FailureEvent>) -> FailureSchedule {
        FailureSchedule::new(events).unwrap()
    }

    fn event(kind: FailureKind, target: FailureTarget, start_ms: u64, dur_ms: u64) -> FailureEvent {
        FailureEvent {
            kind,
            target,
            start_offset: Duration::from_millis(start_ms),
            duration: Duration::from_millis(dur_ms),
        }
    }

    #[test]
    fn packet_loss_blackholes_only_during_window() {
        let node = NodeId::from("edge-1");
        let injector = FailureInjector::new(&schedule(vec![event(
            FailureKind::PacketLoss,
            FailureTarget::Link("edge-1".into()),
            1_000,
            500,
        )]));
        assert!(!injector.is_blackholed(&node, Duration::from_millis(999)));
        assert!(injector.is_blackholed(&node, Duration::from_millis(1_000)));
        assert!(injector.is_blackholed(&node, Duration::from_millis(1_499)));
        assert!(!injector.is_blackholed(&node, Duration::from_millis(1_500)));
    }

    #[test]
    fn crash_never_heals() {
        let node = NodeId::from("edge-1");
        let injector = FailureInjector::new(&schedule(vec![event(
            FailureKind::NodeCrash,
            FailureTarget::Node(node.clone()),
            1_000,
            500,
        )]));
        assert_eq!(injector.state_of(&node, Duration::from_millis(500)), TargetState::Healthy);
        assert_eq!(
            injector.state_of(&node, Duration::from_millis(1_200)),
            TargetState::Degraded(FailureKind::NodeCrash)
        );
        // Past the nominal duration the node is still down.
        assert!(injector.is_blackholed(&node, Duration::from_secs(60)));
    }

    #[test]
    fn other_nodes_are_unaffected() {
        let crashed = NodeId::from("edge-1");
        let healthy = NodeId::from("edge-2");
        let injector = FailureInjector::new(&schedule(vec![event(
            FailureKind::NodeCrash,
            FailureTarget::Node(crashed),
            0,
            1_000,
        )]));
        assert!(!injector.is_blackholed(&healthy, Duration::from_millis(500)));
    }

    #[test]
    fn partition_covers_each_severed_uplink() {
        let a = NodeId::from("edge-a");
        let b = NodeId::from("edge-b");
        let c = NodeId::from("edge-c");
        let injector = FailureInjector::new(&schedule(vec![
            event(FailureKind::Partition, FailureTarget::Link("edge-a".into()), 0, 1_000),
            event(FailureKind::Partition, FailureTarget::Link("edge-b".into()), 0, 1_000),
        ]));
        let mid = Duration::from_millis(500);
        assert!(injector.is_blackholed(&a, mid));
        assert!(injector.is_blackholed(&b, mid));
        assert!(!injector.is_blackholed(&c, mid));
    }

    #[test]
    fn crash_actions_fire_once() {
        let node = NodeId::from("edge-1");
        let mut injector = FailureInjector::new(&schedule(vec![event(
            FailureKind::NodeCrash,
            FailureTarget::Node(node.clone()),
            1_000,
            500,
        )]));
        assert!(injector.drain_due(Duration::from_millis(500)).is_empty());
        assert_eq!(
            injector.drain_due(Duration::from_millis(1_001)),
            vec![FailureAction::TerminateNode(node)]
        );
        assert!(injector.drain_due(Duration::from_millis(2_000)).is_empty());
    }
}
