//! Error types for rivven-firehose
//!
//! Delivery failures are reported per record so callers can reprocess exactly
//! what did not make it into the stream.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::types::Record;

/// Result type alias for delivery operations
pub type DeliveryResult<T> = std::result::Result<T, DeliveryErrors>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A single record (or whole batch) that did not reach the stream
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    /// Record was rejected by schema validation before submission
    #[error("schema error: {description}")]
    Schema {
        original_record: Record,
        description: String,
        details: Value,
    },

    /// The batch call itself failed; nothing in the chunk was accepted
    ///
    /// `details["records"]` holds the original records left undelivered.
    #[error("transport error: {}", transport_message(.details))]
    Transport { details: Value },

    /// The sink kept rejecting this record until retries ran out
    #[error("record error: {description}")]
    Record {
        original_record: Record,
        description: String,
        details: Value,
    },
}

impl DeliveryError {
    /// Short tag for the error kind (`schema`, `transport`, `record`)
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "schema",
            Self::Transport { .. } => "transport",
            Self::Record { .. } => "record",
        }
    }

    /// Human readable description
    pub fn description(&self) -> String {
        match self {
            Self::Schema { description, .. } | Self::Record { description, .. } => {
                description.clone()
            }
            Self::Transport { details } => transport_message(details),
        }
    }

    /// Transport failure for a batch, carrying the records it left undelivered
    pub fn transport(err: TransportError, records: Vec<Record>) -> Self {
        let mut error = Self::from(err);
        error.extend_records(records);
        error
    }

    /// Structured details about the failure
    pub fn details(&self) -> &Value {
        match self {
            Self::Schema { details, .. }
            | Self::Transport { details }
            | Self::Record { details, .. } => details,
        }
    }

    /// The record as the caller submitted it, if the error is about one record
    pub fn original_record(&self) -> Option<&Record> {
        match self {
            Self::Schema {
                original_record, ..
            }
            | Self::Record {
                original_record, ..
            } => Some(original_record),
            Self::Transport { .. } => None,
        }
    }

    /// Records a transport failure left undelivered (empty for other kinds)
    pub fn undelivered_records(&self) -> &[Record] {
        match self {
            Self::Transport { details } => details
                .get("records")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        }
    }

    /// Add records to a transport failure's `records` list; no-op for other kinds
    pub fn extend_records(&mut self, records: impl IntoIterator<Item = Record>) {
        let Self::Transport { details } = self else {
            return;
        };
        let Some(map) = details.as_object_mut() else {
            return;
        };
        if let Some(list) = map
            .entry("records")
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
        {
            list.extend(records);
        }
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

fn transport_message(details: &Value) -> String {
    details
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| details.to_string())
}

impl From<TransportError> for DeliveryError {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            details: serde_json::json!({
                "message": err.message,
                "retryable": err.retryable,
            }),
        }
    }
}

/// Ordered list of every failure from one `put_records` call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeliveryErrors(Vec<DeliveryError>);

impl DeliveryErrors {
    pub fn new(errors: Vec<DeliveryError>) -> Self {
        Self(errors)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeliveryError> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[DeliveryError] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<DeliveryError> {
        self.0
    }

    /// Number of errors of each kind as `(schema, transport, record)`
    pub fn counts(&self) -> (usize, usize, usize) {
        self.0
            .iter()
            .fold((0, 0, 0), |(s, t, r), err| match err {
                DeliveryError::Schema { .. } => (s + 1, t, r),
                DeliveryError::Transport { .. } => (s, t + 1, r),
                DeliveryError::Record { .. } => (s, t, r + 1),
            })
    }

    /// Original records of every failed record, ready to be resubmitted
    ///
    /// Includes the records covered by transport failures.
    pub fn original_records(&self) -> Vec<Record> {
        self.0
            .iter()
            .flat_map(|err| match err.original_record() {
                Some(record) => std::slice::from_ref(record),
                None => err.undelivered_records(),
            })
            .cloned()
            .collect()
    }

    /// Number of records covered by these errors
    pub fn record_count(&self) -> usize {
        self.0
            .iter()
            .map(|err| match err.original_record() {
                Some(_) => 1,
                None => err.undelivered_records().len(),
            })
            .sum()
    }
}

impl fmt::Display for DeliveryErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (schema, transport, record) = self.counts();
        write!(
            f,
            "{} failure(s) ({} schema, {} transport, {} record)",
            self.0.len(),
            schema,
            transport,
            record
        )
    }
}

impl std::error::Error for DeliveryErrors {}

impl From<Vec<DeliveryError>> for DeliveryErrors {
    fn from(errors: Vec<DeliveryError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for DeliveryErrors {
    type Item = DeliveryError;
    type IntoIter = std::vec::IntoIter<DeliveryError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DeliveryErrors {
    type Item = &'a DeliveryError;
    type IntoIter = std::slice::Iter<'a, DeliveryError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Failure of a whole batch call to the sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Whether the sink reported the failure as transient
    pub retryable: bool,
}

impl TransportError {
    /// Create a transport error that may succeed on a later call
    pub fn transient(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a transport error that will not succeed on a later call
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            retryable: false,
        }
    }
}

/// Errors raised while loading or validating stream configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Schema could not be compiled
    #[error("invalid schema: {0}")]
    Schema(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Field-level validation failure
    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_error(id: u64) -> DeliveryError {
        DeliveryError::Record {
            original_record: json!({"id": id}),
            description: "ServiceUnavailableException".to_string(),
            details: json!({"error_code": "ServiceUnavailableException"}),
        }
    }

    #[test]
    fn test_error_type_tags() {
        let schema = DeliveryError::Schema {
            original_record: json!({"firstName": 3}),
            description: "3 is not of type \"string\"".to_string(),
            details: json!({}),
        };
        let transport: DeliveryError = TransportError::transient("connection reset").into();

        assert_eq!(schema.error_type(), "schema");
        assert_eq!(transport.error_type(), "transport");
        assert_eq!(record_error(1).error_type(), "record");
        assert!(transport.is_transport());
        assert_eq!(transport.description(), "connection reset");
        assert!(transport.original_record().is_none());
    }

    #[test]
    fn test_original_records_in_error_order() {
        let errors = DeliveryErrors::new(vec![
            record_error(1),
            TransportError::fatal("boom").into(),
            record_error(2),
        ]);

        assert_eq!(
            errors.original_records(),
            vec![json!({"id": 1}), json!({"id": 2})]
        );
        assert_eq!(errors.counts(), (0, 1, 2));
    }

    #[test]
    fn test_delivery_errors_display() {
        let errors = DeliveryErrors::new(vec![record_error(1)]);
        assert_eq!(
            errors.to_string(),
            "1 failure(s) (0 schema, 0 transport, 1 record)"
        );
    }

    #[test]
    fn test_transport_error_carries_undelivered_records() {
        let mut transport =
            DeliveryError::transport(TransportError::transient("down"), vec![json!({"id": 2})]);
        transport.extend_records(vec![json!({"id": 3}), json!({"id": 4})]);

        assert_eq!(transport.description(), "down");
        assert_eq!(transport.to_string(), "transport error: down");
        assert_eq!(transport.undelivered_records().len(), 3);

        let errors = DeliveryErrors::new(vec![record_error(1), transport]);
        assert_eq!(
            errors.original_records(),
            vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3}), json!({"id": 4})]
        );
        assert_eq!(errors.record_count(), 4);
        assert_eq!(
            errors.to_string(),
            "2 failure(s) (0 schema, 1 transport, 1 record)"
        );
    }
}
