//! Pool occupancy gauges.
//!
//! The manager publishes a full per-status occupancy reading for each
//! partition at the start of every refill run. The sink is a trait so
//! tests can capture readings; the production sink records through the
//! `metrics` facade and leaves exporter wiring to the embedder.

use crate::entry::{EntryStatus, PartitionKey};

/// Receives periodic gauge readings of pool occupancy.
pub trait MetricsSink: Send + Sync {
    /// Record the number of entries in `status` for `partition`.
    fn record_occupancy(&self, partition: &PartitionKey, status: EntryStatus, count: usize);
}

/// [`MetricsSink`] backed by the `metrics` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaugeSink;

impl MetricsSink for GaugeSink {
    fn record_occupancy(&self, partition: &PartitionKey, status: EntryStatus, count: usize) {
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(
            "buffer.occupancy",
            "partition" => partition.to_string(),
            "status" => status.to_string(),
        )
        .set(count as f64);
    }
}

/// Sink that drops every reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record_occupancy(&self, _partition: &PartitionKey, _status: EntryStatus, _count: usize) {}
}
