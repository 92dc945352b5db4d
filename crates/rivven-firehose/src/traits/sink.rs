//! Sink client trait
//!
//! The firehose client is an external collaborator: connection setup,
//! credentials and wire protocol live behind this trait. Implementations must
//! keep the positional contract of the batch response: entry `i` of
//! `request_responses` describes record `i` of the submitted batch.

use crate::error::TransportError;
use crate::types::FormattedRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome for one record of a batch call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordResult {
    /// Identifier assigned by the sink to an accepted record
    #[serde(default)]
    pub record_id: Option<String>,
    /// Set when the sink rejected the record
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl RecordResult {
    /// Accepted record
    pub fn accepted(record_id: impl Into<String>) -> Self {
        Self {
            record_id: Some(record_id.into()),
            error_code: None,
            error_message: None,
        }
    }

    /// Rejected record
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            record_id: None,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    /// Check if the sink rejected this record
    pub fn is_rejected(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Response of a successful batch call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BatchResponse {
    /// Number of rejected records as reported by the sink
    pub failed_put_count: usize,
    /// Per-record results, positionally matching the submitted batch
    pub request_responses: Vec<RecordResult>,
}

impl BatchResponse {
    /// Build a response from per-record results
    pub fn from_results(request_responses: Vec<RecordResult>) -> Self {
        let failed_put_count = request_responses
            .iter()
            .filter(|r| r.is_rejected())
            .count();
        Self {
            failed_put_count,
            request_responses,
        }
    }

    /// Response accepting every record of a batch of `len`
    pub fn all_accepted(len: usize) -> Self {
        Self::from_results(
            (0..len)
                .map(|i| RecordResult::accepted(format!("record-{}", i)))
                .collect(),
        )
    }
}

/// Client for a firehose-style ingestion service
#[async_trait]
pub trait FirehoseClient: Send + Sync {
    /// Submit one bounded batch to the named delivery stream
    ///
    /// Returns `Err` only when the call as a whole failed. Individual record
    /// rejections are reported in the response.
    async fn put_record_batch(
        &self,
        stream_name: &str,
        records: &[FormattedRecord],
    ) -> std::result::Result<BatchResponse, TransportError>;
}
