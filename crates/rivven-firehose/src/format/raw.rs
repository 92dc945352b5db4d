//! Raw text formatter

use super::{terminate, RecordFormatter};
use crate::types::{FormattedRecord, Record};
use serde_json::Value;

/// Writes the record as text followed by a newline.
///
/// String records are written verbatim; any other value is written as its
/// compact JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFormatter;

impl RecordFormatter for RawFormatter {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn format(&self, record: &Record) -> FormattedRecord {
        match record {
            Value::String(text) => terminate(text.clone()),
            other => terminate(other.to_string()),
        }
    }
}
