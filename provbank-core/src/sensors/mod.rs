//! ## provbank-core::sensors
//! **Multi-sensor traffic generation**
//!
//! Turns a set of sensor sessions into one lazy, ordered stream of due-timed
//! emissions. Thousands of sessions multiplex through a single binary heap
//! of due-times — one scheduling loop, no per-sensor execution context. The
//! stream is finite (bounded by the scenario duration), restartable by
//! rebuilding the generator with the same seed, and deterministic in its
//! due-times for a given seed.
//!
//! Emission order respects due-time ordering; ties break by `sensor_index`
//! ascending.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::NodeId;

mod readings;

pub use readings::SensorType;

use readings::ReadingSynth;

/// How a sensor spaces its emissions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EmissionPattern {
    /// Fixed inter-arrival interval.
    Periodic { interval: Duration },
    /// Alternating high-rate and low-rate phases.
    Bursty {
        burst_rate: f64,
        idle_rate: f64,
        burst_len: Duration,
        idle_len: Duration,
    },
    /// Exponential inter-arrival times with the given mean rate (events/sec).
    Poisson { mean_rate: f64 },
}

/// One logical sensor for the duration of a scenario. Owned exclusively by
/// the generator that schedules it.
#[derive(Clone, Debug)]
pub struct SensorSession {
    pub node_id: NodeId,
    pub sensor_index: u32,
    pub sensor_type: SensorType,
    pub pattern: EmissionPattern,
}

/// One scheduled sensor emission: where it originates, when it is due
/// (microseconds from run start), its sequence number, and the reading
/// payload.
///
/// `sequence` counts per logical sender — the node's emission stream, one
/// counter shared by all of a node's sensors — so it strictly increases
/// with send order within a node and wraps at `u32::MAX`.
#[derive(Clone, Debug)]
pub struct Emission {
    pub node_id: NodeId,
    pub sensor_index: u32,
    pub sequence: u32,
    pub due_us: u64,
    pub payload: Bytes,
}

struct SessionState {
    session: SensorSession,
    synth: ReadingSynth,
    device: String,
}

/// Due-time multiplexer over all sessions of one node.
pub struct TrafficGenerator {
    states: Vec<SessionState>,
    // (due_us, sensor_index, state slot), min-first.
    heap: BinaryHeap<Reverse<(u64, u32, u32)>>,
    sequences: HashMap<NodeId, u32>,
    end_us: u64,
    rng: SmallRng,
}

impl TrafficGenerator {
    pub fn new(sessions: Vec<SensorSession>, duration: Duration, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut states = Vec::with_capacity(sessions.len());
        let mut heap = BinaryHeap::with_capacity(sessions.len());
        for (slot, session) in sessions.into_iter().enumerate() {
            let synth = ReadingSynth::new(session.sensor_type, &mut rng);
            let device = format!("{:?}_{}", session.sensor_type, session.sensor_index)
                .to_ascii_lowercase();
            heap.push(Reverse((0, session.sensor_index, slot as u32)));
            states.push(SessionState {
                session,
                synth,
                device,
            });
        }
        Self {
            states,
            heap,
            sequences: HashMap::new(),
            end_us: duration.as_micros() as u64,
            rng,
        }
    }

    /// Remaining sessions still scheduled for at least one emission.
    pub fn pending_sessions(&self) -> usize {
        self.heap.len()
    }

    fn interval_us(&mut self, slot: usize, due_us: u64) -> u64 {
        let pattern = self.states[slot].session.pattern;
        match pattern {
            EmissionPattern::Periodic { interval } => (interval.as_micros() as u64).max(1),
            EmissionPattern::Bursty {
                burst_rate,
                idle_rate,
                burst_len,
                idle_len,
            } => {
                let burst_us = burst_len.as_micros() as u64;
                let cycle_us = (burst_us + idle_len.as_micros() as u64).max(1);
                let rate = if due_us % cycle_us < burst_us {
                    burst_rate
                } else {
                    idle_rate
                };
                ((1_000_000.0 / rate.max(f64::MIN_POSITIVE)) as u64).max(1)
            }
            EmissionPattern::Poisson { mean_rate } => {
                // Inverse-transform sample of an exponential inter-arrival.
                let u: f64 = self.rng.random();
                let dt = -(1.0 - u).ln() / mean_rate.max(f64::MIN_POSITIVE);
                ((dt * 1_000_000.0) as u64).max(1)
            }
        }
    }
}

impl Iterator for TrafficGenerator {
    type Item = Emission;

    fn next(&mut self) -> Option<Emission> {
        let Reverse((due_us, sensor_index, slot)) = self.heap.pop()?;
        let slot = slot as usize;

        let next_due = due_us.saturating_add(self.interval_us(slot, due_us));
        if next_due < self.end_us {
            self.heap.push(Reverse((next_due, sensor_index, slot as u32)));
        }

        let state = &mut self.states[slot];
        let payload = state.synth.sample(&state.device, &mut self.rng);
        let counter = self.sequences.entry(state.session.node_id.clone()).or_insert(0);
        let sequence = *counter;
        *counter = counter.wrapping_add(1);

        Some(Emission {
            node_id: state.session.node_id.clone(),
            sensor_index,
            sequence,
            due_us,
            payload: Bytes::from(payload),
        })
    }
}
