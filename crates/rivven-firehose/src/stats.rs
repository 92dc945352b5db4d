//! Delivery counters
//!
//! Plain atomic counters shared between a stream and its drains. A
//! [`DeliveryStatsSnapshot`] is cheap to take and safe to log or export.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for a delivery stream
#[derive(Debug, Default)]
pub struct DeliveryStats {
    /// Records passed to `put_records`
    pub records_received: AtomicU64,
    /// Records accepted by the sink
    pub records_delivered: AtomicU64,
    /// Records rejected by schema validation
    pub records_invalid: AtomicU64,
    /// Records resubmitted after a partial rejection
    pub records_retried: AtomicU64,
    /// Records given up on after exhausting retries
    pub records_failed: AtomicU64,
    /// Batch calls made to the sink
    pub batches_sent: AtomicU64,
    /// Batch calls that failed as a whole
    pub transport_failures: AtomicU64,
    /// Chunks never dispatched because an earlier chunk failed
    pub chunks_skipped: AtomicU64,
    /// Payload bytes submitted (including resubmissions)
    pub bytes_sent: AtomicU64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Get snapshot of counters
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_invalid: self.records_invalid.load(Ordering::Relaxed),
            records_retried: self.records_retried.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            chunks_skipped: self.chunks_skipped.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStatsSnapshot {
    pub records_received: u64,
    pub records_delivered: u64,
    pub records_invalid: u64,
    pub records_retried: u64,
    pub records_failed: u64,
    pub batches_sent: u64,
    pub transport_failures: u64,
    pub chunks_skipped: u64,
    pub bytes_sent: u64,
}

impl DeliveryStatsSnapshot {
    /// Share of received records that reached the sink (0.0-1.0)
    pub fn delivery_rate(&self) -> f64 {
        if self.records_received == 0 {
            1.0
        } else {
            self.records_delivered as f64 / self.records_received as f64
        }
    }
}
