//! Per-chunk drain: submit, inspect the partial-failure response, retry
//! leftovers.
//!
//! ```text
//!                 ┌──────────── rejected, attempt < max_retries ───────────┐
//!                 ▼                                                         │
//!   Submitting(attempt) ── all accepted ──▶ Delivered                       │
//!        │    │                                                             │
//!        │    └── rejected, attempt == max_retries ──▶ Exhausted            │
//!        │                                                                  │
//!        └── call failed ──▶ Failed            Retrying(attempt + 1) ───────┘
//!                                                 (sleep retry_interval,
//!                                                  re-format originals)
//! ```
//!
//! Each transition consumes the previous state and produces the next one, so
//! the machine carries no shared mutable context between attempts. Retries
//! always re-format the caller's original records; a payload is never wrapped
//! twice.

use crate::error::DeliveryError;
use crate::format::RecordFormatter;
use crate::stats::DeliveryStats;
use crate::traits::batch::Chunk;
use crate::traits::retry::{RetryPolicy, RetryState};
use crate::traits::sink::{FirehoseClient, RecordResult};
use crate::types::{FormattedRecord, Record};
use metrics::counter;
use serde_json::json;
use tracing::{debug, warn};

/// State of one chunk's drain
#[derive(Debug, Clone, PartialEq)]
pub enum DrainState {
    /// About to submit `payloads`, which were formatted from `state.records`
    Submitting {
        state: RetryState,
        payloads: Vec<FormattedRecord>,
    },
    /// Waiting out the retry interval before resubmitting the leftovers
    Retrying(RetryState),
    /// Every record was accepted
    Delivered { attempts: u32 },
    /// Leftovers were still rejected on the last allowed attempt
    Exhausted(Vec<DeliveryError>),
    /// The batch call failed as a whole
    Failed(DeliveryError),
}

impl DrainState {
    /// Entry state for a freshly split chunk
    pub fn start(chunk: Chunk) -> Self {
        let (records, payloads) = chunk.into_parts();
        Self::Submitting {
            state: RetryState::initial(records),
            payloads,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered { .. } | Self::Exhausted(_) | Self::Failed(_)
        )
    }
}

/// Drives chunks through [`DrainState`] transitions against a sink
pub struct Drainer<'a> {
    stream_name: &'a str,
    client: &'a dyn FirehoseClient,
    formatter: &'a dyn RecordFormatter,
    policy: RetryPolicy,
    stats: &'a DeliveryStats,
}

impl<'a> Drainer<'a> {
    pub fn new(
        stream_name: &'a str,
        client: &'a dyn FirehoseClient,
        formatter: &'a dyn RecordFormatter,
        policy: RetryPolicy,
        stats: &'a DeliveryStats,
    ) -> Self {
        Self {
            stream_name,
            client,
            formatter,
            policy,
            stats,
        }
    }

    /// Run a chunk to a terminal state
    pub async fn drain(&self, chunk: Chunk) -> DrainState {
        let mut state = DrainState::start(chunk);
        while !state.is_terminal() {
            state = self.step(state).await;
        }
        state
    }

    /// Perform one transition
    pub async fn step(&self, state: DrainState) -> DrainState {
        match state {
            DrainState::Submitting { state, payloads } => self.submit(state, payloads).await,
            DrainState::Retrying(state) => {
                tokio::time::sleep(self.policy.retry_interval).await;
                let payloads = state
                    .records
                    .iter()
                    .map(|r| self.formatter.format(r))
                    .collect();
                DrainState::Submitting { state, payloads }
            }
            terminal => terminal,
        }
    }

    async fn submit(&self, state: RetryState, payloads: Vec<FormattedRecord>) -> DrainState {
        let bytes: usize = payloads.iter().map(FormattedRecord::len).sum();
        DeliveryStats::add(&self.stats.batches_sent, 1);
        DeliveryStats::add(&self.stats.bytes_sent, bytes);
        counter!("firehose.batches.sent").increment(1);

        let response = match self
            .client
            .put_record_batch(self.stream_name, &payloads)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Stream '{}' batch of {} record(s) failed on attempt {}: {}",
                    self.stream_name,
                    payloads.len(),
                    state.attempt + 1,
                    e
                );
                DeliveryStats::add(&self.stats.transport_failures, 1);
                counter!("firehose.batches.failed").increment(1);
                return DrainState::Failed(DeliveryError::transport(e, state.records));
            }
        };

        if response.request_responses.len() != payloads.len() {
            warn!(
                "Stream '{}' sink returned {} result(s) for {} record(s)",
                self.stream_name,
                response.request_responses.len(),
                payloads.len()
            );
            DeliveryStats::add(&self.stats.transport_failures, 1);
            counter!("firehose.batches.failed").increment(1);
            let mut error = DeliveryError::Transport {
                details: json!({
                    "message": "response does not match submitted batch",
                    "submitted": payloads.len(),
                    "responses": response.request_responses.len(),
                }),
            };
            error.extend_records(state.records);
            return DrainState::Failed(error);
        }

        let rejected: Vec<(Record, RecordResult)> = state
            .records
            .iter()
            .zip(response.request_responses)
            .filter(|(_, result)| result.is_rejected())
            .map(|(record, result)| (record.clone(), result))
            .collect();

        if rejected.len() != response.failed_put_count {
            debug!(
                "Stream '{}' sink reported {} failure(s) but {} result(s) carry an error code",
                self.stream_name,
                response.failed_put_count,
                rejected.len()
            );
        }

        let delivered = state.records.len() - rejected.len();
        DeliveryStats::add(&self.stats.records_delivered, delivered);
        counter!("firehose.records.delivered").increment(delivered as u64);

        if rejected.is_empty() {
            return DrainState::Delivered {
                attempts: state.attempt + 1,
            };
        }

        if self.policy.allows_retry(state.attempt) {
            debug!(
                "Stream '{}' {} record(s) rejected on attempt {}, retrying in {:?}",
                self.stream_name,
                rejected.len(),
                state.attempt + 1,
                self.policy.retry_interval
            );
            DeliveryStats::add(&self.stats.records_retried, rejected.len());
            counter!("firehose.records.retried").increment(rejected.len() as u64);
            let leftovers = rejected.into_iter().map(|(record, _)| record).collect();
            return DrainState::Retrying(state.next(leftovers));
        }

        let attempts = state.attempt + 1;
        warn!(
            "Stream '{}' giving up on {} record(s) after {} attempt(s)",
            self.stream_name,
            rejected.len(),
            attempts
        );
        DeliveryStats::add(&self.stats.records_failed, rejected.len());
        counter!("firehose.records.failed").increment(rejected.len() as u64);
        DrainState::Exhausted(
            rejected
                .into_iter()
                .map(|(record, result)| exhausted_error(record, result, attempts))
                .collect(),
        )
    }
}

fn exhausted_error(record: Record, result: RecordResult, attempts: u32) -> DeliveryError {
    let description = result
        .error_message
        .clone()
        .or_else(|| result.error_code.clone())
        .unwrap_or_else(|| "record rejected".to_string());
    DeliveryError::Record {
        original_record: record,
        description,
        details: json!({
            "error_code": result.error_code,
            "error_message": result.error_message,
            "attempts": attempts,
        }),
    }
}
