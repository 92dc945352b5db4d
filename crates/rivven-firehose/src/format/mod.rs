//! Record formatters
//!
//! A formatter turns one validated record into the payload the sink stores.
//! The strategy is chosen once when the stream is built; the original record
//! is only borrowed, so retries can always re-format from the source value.
//!
//! | Format | Payload |
//! |--------|---------|
//! | `raw`  | record text + `\n` |
//! | `json` | compact JSON + `\n` |

pub mod json;
pub mod raw;

pub use json::JsonFormatter;
pub use raw::RawFormatter;

use crate::types::{FormattedRecord, Record};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Trait for turning records into sink payloads
pub trait RecordFormatter: Send + Sync {
    /// Formatter name (e.g., "raw", "json")
    fn name(&self) -> &'static str;

    /// Format a single record. Must be pure and deterministic.
    fn format(&self, record: &Record) -> FormattedRecord;
}

/// Formatter selection for configuration files
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Record written as text, newline terminated
    #[default]
    Raw,
    /// Record serialized to JSON, newline terminated
    Json,
}

impl RecordFormat {
    /// Build the formatter for this format
    pub fn formatter(self) -> Arc<dyn RecordFormatter> {
        match self {
            RecordFormat::Raw => Arc::new(RawFormatter),
            RecordFormat::Json => Arc::new(JsonFormatter),
        }
    }
}

/// Append the record terminator to a line of text
pub(crate) fn terminate(line: String) -> FormattedRecord {
    let mut bytes = line.into_bytes();
    bytes.push(b'\n');
    FormattedRecord::new(bytes)
}
