//! Prometheus exposition for live runs.
//!
//! Run-final statistics come from the aggregator; these are the live
//! counters an operator watches while a long scenario executes.

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub records_sent: Counter,
    pub records_received: Counter,
    pub records_dropped: Counter,
    pub send_latency_ms: Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let records_sent =
            Counter::new("provbank_records_sent_total", "Records handed to the plugin").unwrap();
        let records_received =
            Counter::new("provbank_records_received_total", "Records acknowledged by the server")
                .unwrap();
        let records_dropped = Counter::new(
            "provbank_records_dropped_total",
            "Records lost to impairment, failures, or timeouts",
        )
        .unwrap();
        let send_latency_ms = Histogram::with_opts(
            HistogramOpts::new("provbank_send_latency_ms", "Per-record one-way latency")
                .buckets(vec![0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]),
        )
        .unwrap();

        registry.register(Box::new(records_sent.clone())).unwrap();
        registry.register(Box::new(records_received.clone())).unwrap();
        registry.register(Box::new(records_dropped.clone())).unwrap();
        registry.register(Box::new(send_latency_ms.clone())).unwrap();

        Self {
            registry,
            records_sent,
            records_received,
            records_dropped,
            send_latency_ms,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}
