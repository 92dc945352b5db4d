//! Common types for rivven-firehose

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

/// An application record as submitted by the caller.
///
/// Records stay opaque until they are formatted; raw text records are plain
/// JSON strings.
pub type Record = serde_json::Value;

/// Wire payload for one record, produced once by a [`RecordFormatter`]
///
/// [`RecordFormatter`]: crate::format::RecordFormatter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedRecord {
    data: Bytes,
}

impl FormattedRecord {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload bytes as they are sent to the sink
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload as UTF-8 text (lossy)
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Format a timestamp the way Redshift `COPY` expects it (`YYYY-MM-DD HH:MM:SS`, UTC)
///
/// # Example
///
/// ```rust
/// use chrono::{FixedOffset, TimeZone};
/// use rivven_firehose::redshift_timestamp;
///
/// let ts = FixedOffset::east_opt(2 * 3600)
///     .unwrap()
///     .with_ymd_and_hms(2024, 3, 1, 12, 30, 5)
///     .unwrap();
/// assert_eq!(redshift_timestamp(&ts), "2024-03-01 10:30:05");
/// ```
pub fn redshift_timestamp<Tz: TimeZone>(input: &DateTime<Tz>) -> String {
    input
        .with_timezone(&Utc)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
