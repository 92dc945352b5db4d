//! Bounded-concurrency dispatch of chunk drains
//!
//! Chunks are launched in order with at most `max_drains` in flight. All
//! drains are polled from the calling task, so "concurrent" means overlapping
//! sink calls, not extra threads. A transport failure stops new launches but
//! lets drains already in flight settle before the results are aggregated.
//! Records of chunks that were never launched are attached to the transport
//! error that stopped dispatch.

use crate::drain::{DrainState, Drainer};
use crate::error::DeliveryError;
use crate::stats::DeliveryStats;
use crate::traits::batch::Chunk;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

/// Default number of chunk drains in flight per call
pub const DEFAULT_MAX_DRAINS: usize = 3;

/// Dispatches chunks to a [`Drainer`] with a concurrency ceiling
pub struct DrainScheduler<'a> {
    drainer: Drainer<'a>,
    max_drains: usize,
    stats: &'a DeliveryStats,
}

impl<'a> DrainScheduler<'a> {
    /// Create a scheduler. A `max_drains` of 0 is treated as 1.
    pub fn new(drainer: Drainer<'a>, max_drains: usize, stats: &'a DeliveryStats) -> Self {
        Self {
            drainer,
            max_drains: max_drains.max(1),
            stats,
        }
    }

    /// Drain every chunk and return the residual errors in chunk order
    pub async fn run(&self, chunks: Vec<Chunk>) -> Vec<DeliveryError> {
        let total = chunks.len();
        let mut outcomes: Vec<Option<DrainState>> = vec![None; total];
        let mut pending = chunks.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut halted_at: Option<usize> = None;

        loop {
            while halted_at.is_none() && in_flight.len() < self.max_drains {
                let Some((index, chunk)) = pending.next() else {
                    break;
                };
                debug!("Dispatching chunk {}/{} ({} record(s))", index + 1, total, chunk.len());
                in_flight.push(async move { (index, self.drainer.drain(chunk).await) });
            }

            let Some((index, outcome)) = in_flight.next().await else {
                break;
            };

            if matches!(outcome, DrainState::Failed(_)) && halted_at.is_none() {
                halted_at = Some(index);
                warn!(
                    "Chunk {}/{} failed at the transport level, not dispatching further chunks",
                    index + 1,
                    total
                );
            }
            outcomes[index] = Some(outcome);
        }

        let skipped: Vec<Chunk> = pending.map(|(_, chunk)| chunk).collect();
        if !skipped.is_empty() {
            let chunk_count = skipped.len();
            DeliveryStats::add(&self.stats.chunks_skipped, chunk_count);
            let records: Vec<_> = skipped
                .into_iter()
                .flat_map(|chunk| chunk.into_parts().0)
                .collect();
            warn!(
                "{} chunk(s) with {} record(s) were not dispatched",
                chunk_count,
                records.len()
            );
            if let Some(index) = halted_at {
                if let Some(Some(DrainState::Failed(error))) = outcomes.get_mut(index) {
                    error.extend_records(records);
                }
            }
        }

        outcomes
            .into_iter()
            .flatten()
            .flat_map(|outcome| match outcome {
                DrainState::Exhausted(errors) => errors,
                DrainState::Failed(error) => vec![error],
                _ => Vec::new(),
            })
            .collect()
    }
}
