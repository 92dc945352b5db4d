//! JSON formatter (newline-delimited)

use super::{terminate, RecordFormatter};
use crate::types::{FormattedRecord, Record};

/// Serializes the record to compact JSON followed by a newline
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl RecordFormatter for JsonFormatter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn format(&self, record: &Record) -> FormattedRecord {
        terminate(record.to_string())
    }
}
