//! ## provbank-core::metrics
//! **Per-packet record aggregation**
//!
//! Collects `MetricRecord`s from every measurement path — live acks in
//! active mode, REPORT batches from remote nodes, receipt-log reconstruction
//! in passive mode — and reduces them to per-run statistics. Arrival order
//! is meaningless (sequence numbers are not arrival order) and missing
//! records are losses, not errors. Cross-node timestamps are corrected with
//! the per-node clock offset estimated at registration before any latency
//! math.
//!
//! The aggregator is the single writer of the final statistics; callers that
//! ingest concurrently serialize access behind a lock.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::time::ClockOffset;
use crate::NodeId;

/// One measured packet. `received_at_us` is absent when the packet was lost
/// (dropped, timed out, or never acknowledged).
///
/// `sent_at_us` is on the *sender's* clock; `received_at_us` is on the
/// receiving server's clock. The aggregator reconciles the two.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub node_id: NodeId,
    pub sequence: u32,
    pub sent_at_us: u64,
    pub received_at_us: Option<u64>,
}

/// Latency distribution in microseconds, after offset correction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min_us: u64,
    pub median_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Per-node sent/received/loss breakdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatistics {
    pub sent: u64,
    pub received: u64,
    pub loss_rate: f64,
}

/// Aggregate result set for one run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub sent: u64,
    pub received: u64,
    pub loss_rate: f64,
    pub latency: Option<LatencySummary>,
    pub throughput_rps: f64,
    pub send_timeouts: u64,
    pub malformed: u64,
    pub per_node: BTreeMap<NodeId, NodeStatistics>,
}

/// Records/sec over one fixed window of the run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThroughputWindow {
    pub start_us: u64,
    pub records: u64,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    sent_at_us: u64,
    received_at_us: Option<u64>,
}

/// Out-of-order-tolerant collector keyed by `(node, sequence)`.
#[derive(Default)]
pub struct MetricsAggregator {
    records: HashMap<NodeId, HashMap<u32, Slot>>,
    offsets: HashMap<NodeId, ClockOffset>,
    send_timeouts: u64,
    malformed: u64,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the clock offset of `node` relative to the local timebase.
    /// Applied to every `sent_at_us` from that node during finalization.
    pub fn set_clock_offset(&mut self, node: NodeId, offset: ClockOffset) {
        self.offsets.insert(node, offset);
    }

    /// Ingests one record. Duplicate `(node, sequence)` pairs merge: a
    /// receipt upgrades an earlier loss, never the other way around.
    pub fn ingest(&mut self, record: MetricRecord) {
        let slot = self
            .records
            .entry(record.node_id)
            .or_default()
            .entry(record.sequence)
            .or_insert(Slot {
                sent_at_us: record.sent_at_us,
                received_at_us: None,
            });
        if slot.received_at_us.is_none() {
            slot.received_at_us = record.received_at_us;
        }
    }

    /// Ingests a REPORT batch from a remote node. Ingestion is commutative,
    /// so arrival order across nodes does not matter.
    pub fn ingest_batch(&mut self, records: Vec<MetricRecord>) {
        for record in records {
            self.ingest(record);
        }
    }

    /// Per-record send timeout: counted as loss, never fatal.
    pub fn note_send_timeout(&mut self) {
        self.send_timeouts += 1;
    }

    /// Malformed header on receipt: fatal to that record only.
    pub fn note_malformed(&mut self) {
        self.malformed += 1;
    }

    pub fn records_seen(&self) -> u64 {
        self.records.values().map(|m| m.len() as u64).sum()
    }

    fn corrected_latency_us(&self, node: &NodeId, slot: &Slot) -> Option<u64> {
        let received = slot.received_at_us?;
        let offset = self.offsets.get(node).copied().unwrap_or_default();
        let sent_local = slot.sent_at_us.saturating_add_signed(offset.offset_us);
        Some(received.saturating_sub(sent_local))
    }

    /// Reduces everything ingested so far into run statistics. Callable on
    /// failure paths too: partial metrics are preserved, not discarded.
    pub fn finalize(&self, duration: Duration) -> RunStatistics {
        let mut per_node = BTreeMap::new();
        let mut latencies = Vec::new();
        let mut sent = 0u64;
        let mut received = 0u64;

        for (node, slots) in &self.records {
            let node_sent = slots.len() as u64;
            let node_received = slots.values().filter(|s| s.received_at_us.is_some()).count() as u64;
            sent += node_sent;
            received += node_received;
            per_node.insert(
                node.clone(),
                NodeStatistics {
                    sent: node_sent,
                    received: node_received,
                    loss_rate: loss_rate(node_sent, node_received),
                },
            );
            latencies.extend(
                slots
                    .values()
                    .filter_map(|slot| self.corrected_latency_us(node, slot)),
            );
        }

        latencies.sort_unstable();
        let latency = if latencies.is_empty() {
            None
        } else {
            Some(LatencySummary {
                min_us: latencies[0],
                median_us: percentile(&latencies, 50),
                p95_us: percentile(&latencies, 95),
                p99_us: percentile(&latencies, 99),
                max_us: latencies[latencies.len() - 1],
            })
        };

        let secs = duration.as_secs_f64();
        RunStatistics {
            sent,
            received,
            loss_rate: loss_rate(sent, received),
            latency,
            throughput_rps: if secs > 0.0 { received as f64 / secs } else { 0.0 },
            send_timeouts: self.send_timeouts,
            malformed: self.malformed,
            per_node,
        }
    }

    /// Received records bucketed into fixed windows by corrected receive
    /// time, for throughput-over-time reporting.
    pub fn windowed_throughput(&self, window: Duration) -> Vec<ThroughputWindow> {
        let window_us = (window.as_micros() as u64).max(1);
        let mut buckets: BTreeMap<u64, u64> = BTreeMap::new();
        for slots in self.records.values() {
            for slot in slots.values() {
                if let Some(received) = slot.received_at_us {
                    *buckets.entry(received / window_us).or_default() += 1;
                }
            }
        }
        buckets
            .into_iter()
            .map(|(bucket, records)| ThroughputWindow {
                start_us: bucket * window_us,
                records,
            })
            .collect()
    }
}

fn loss_rate(sent: u64, received: u64) -> f64 {
    if sent == 0 {
        0.0
    } else {
        (sent.saturating_sub(received)) as f64 / sent as f64
    }
}

/// Sorted-index percentile over an already-sorted slice.
fn percentile(sorted: &[u64], p: usize) -> u64 {
    let index = (sorted.len() * p / 100).min(sorted.len() - 1);
    sorted[index]
}

/// Reconstructs records from a receipt log written out-of-band by a passive
/// protocol: one `sequence sent_us received_us` triple per line, whitespace
/// separated. Malformed lines are skipped, not errors.
pub fn parse_receipt_log(node_id: &NodeId, input: &str) -> Vec<MetricRecord> {
    input
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let sequence = fields.next()?.parse().ok()?;
            let sent_at_us = fields.next()?.parse().ok()?;
            let received_at_us = fields.next()?.parse().ok()?;
            Some(MetricRecord {
                node_id: node_id.clone(),
                sequence,
                sent_at_us,
                received_at_us: Some(received_at_us),
            })
        })
        .collect()
}
