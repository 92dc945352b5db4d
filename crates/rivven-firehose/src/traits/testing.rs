//! Testing utilities for delivery streams
//!
//! [`MockFirehose`] is an in-memory [`FirehoseClient`] with scripted
//! responses. It records every batch it receives so tests can assert on
//! chunk sizes, attempts and the exact payload bytes.
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_firehose::testing::MockFirehose;
//!
//! // Reject every record on the first call, accept everything afterwards
//! let firehose = Arc::new(MockFirehose::new().reject_first_calls(1));
//! let stream = DeliveryStream::builder("events", firehose.clone()).build()?;
//!
//! stream.put_record(json!("hello")).await?;
//! assert_eq!(firehose.call_count(), 2);
//! ```

use super::sink::{BatchResponse, FirehoseClient, RecordResult};
use crate::error::TransportError;
use crate::types::FormattedRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted response: `(call_index, batch) -> response`
pub type ResponseFn =
    dyn Fn(usize, &[FormattedRecord]) -> Result<BatchResponse, TransportError> + Send + Sync;

/// A batch received by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBatch {
    pub stream_name: String,
    pub records: Vec<FormattedRecord>,
}

impl RecordedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Payloads as text
    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(FormattedRecord::as_text).collect()
    }
}

/// A mock firehose client for testing
pub struct MockFirehose {
    respond: Arc<ResponseFn>,
    latency: Option<Duration>,
    batches: Arc<Mutex<Vec<RecordedBatch>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl std::fmt::Debug for MockFirehose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFirehose")
            .field("calls", &self.call_count())
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl Default for MockFirehose {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFirehose {
    /// Create a mock that accepts every record
    pub fn new() -> Self {
        Self::with_responder(|_, batch| Ok(BatchResponse::all_accepted(batch.len())))
    }

    /// Create a mock with a custom response function
    pub fn with_responder<F>(respond: F) -> Self
    where
        F: Fn(usize, &[FormattedRecord]) -> Result<BatchResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            respond: Arc::new(respond),
            latency: None,
            batches: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make every call fail at the transport level
    pub fn fail_with(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_responder(move |_, _| Err(TransportError::transient(message.clone())))
    }

    /// Reject every record of the first `n` calls, accept afterwards
    pub fn reject_first_calls(self, n: usize) -> Self {
        Self::with_responder(move |call, batch| {
            if call < n {
                Ok(reject_all(batch.len()))
            } else {
                Ok(BatchResponse::all_accepted(batch.len()))
            }
        })
        .with_optional_latency(self.latency)
    }

    /// Reject every record on every call
    pub fn reject_always() -> Self {
        Self::with_responder(|_, batch| Ok(reject_all(batch.len())))
    }

    /// Simulate network latency on every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn with_optional_latency(mut self, latency: Option<Duration>) -> Self {
        self.latency = latency;
        self
    }

    /// Batches received so far, in call order
    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.batches.lock().clone()
    }

    /// Number of calls received
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Total number of records submitted across all calls
    pub fn submitted_count(&self) -> usize {
        self.batches.lock().iter().map(RecordedBatch::len).sum()
    }

    /// Highest number of calls that were in progress at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn reject_all(len: usize) -> BatchResponse {
    BatchResponse::from_results(
        (0..len)
            .map(|_| RecordResult::rejected("ServiceUnavailableException", "Slow down."))
            .collect(),
    )
}

#[async_trait]
impl FirehoseClient for MockFirehose {
    async fn put_record_batch(
        &self,
        stream_name: &str,
        records: &[FormattedRecord],
    ) -> Result<BatchResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().push(RecordedBatch {
            stream_name: stream_name.to_string(),
            records: records.to_vec(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.respond)(call, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> Vec<FormattedRecord> {
        (0..n)
            .map(|i| FormattedRecord::new(format!("{}\n", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_mock_accepts_and_records() {
        let mock = MockFirehose::new();
        let response = mock.put_record_batch("s", &batch(3)).await.unwrap();

        assert_eq!(response.failed_put_count, 0);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.batches()[0].texts(), vec!["0\n", "1\n", "2\n"]);
        assert_eq!(mock.batches()[0].stream_name, "s");
    }

    #[tokio::test]
    async fn test_mock_reject_first_calls() {
        let mock = MockFirehose::new().reject_first_calls(1);

        let first = mock.put_record_batch("s", &batch(2)).await.unwrap();
        let second = mock.put_record_batch("s", &batch(2)).await.unwrap();

        assert_eq!(first.failed_put_count, 2);
        assert_eq!(second.failed_put_count, 0);
    }

    #[tokio::test]
    async fn test_mock_transport_failure() {
        let mock = MockFirehose::fail_with("OH NOES! Firehose Error!");
        let err = mock.put_record_batch("s", &batch(1)).await.unwrap_err();
        assert_eq!(err.message, "OH NOES! Firehose Error!");
        assert_eq!(mock.submitted_count(), 1);
    }
}
