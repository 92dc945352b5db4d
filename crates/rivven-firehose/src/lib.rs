//! rivven-firehose - Reliable delivery of records to firehose-style ingestion sinks
//!
//! A firehose accepts bounded batches, may reject individual records inside an
//! otherwise successful call, and may fail a whole call. This crate validates,
//! formats, chunks and submits records, retries exactly the rejected ones, and
//! reports every record that could not be delivered.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ QueuableDeliveryStream (optional)  time/size buffer cycles       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ DeliveryStream                                                   │
//! │  validate_all ─▶ RecordFormatter ─▶ split_into_chunks            │
//! │        ─▶ DrainScheduler (≤ max_drains) ─▶ Drainer (retries)     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ FirehoseClient (your transport, or testing::MockFirehose)        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use rivven_firehose::prelude::*;
//!
//! let stream = DeliveryStream::json("clickstream", Arc::new(my_client))?;
//!
//! match stream.put_records(records).await {
//!     Ok(()) => {}
//!     Err(errors) => {
//!         for error in &errors {
//!             tracing::warn!("{}: {}", error.error_type(), error.description());
//!         }
//!         retry_later(errors.original_records());
//!     }
//! }
//!
//! // Batch across calls: flush every 30s or every 500 records
//! let buffered = QueuableDeliveryStream::new(stream, BufferConfig::default());
//! buffered.put_record(json!({"user_id": 7})).await?;
//! ```

// Core traits: sink client, validation, chunking, retry, testing
pub mod traits;
// Record and payload types
pub mod types;
// Error types
pub mod error;
pub mod config;
pub mod format;
pub mod stats;
// Delivery pipeline
pub mod buffer;
pub mod drain;
pub mod scheduler;
pub mod stream;

pub use buffer::QueuableDeliveryStream;
pub use config::{BufferConfig, DeliveryStreamConfig};
pub use error::{
    ConfigError, ConfigResult, DeliveryError, DeliveryErrors, DeliveryResult, TransportError,
};
pub use format::{JsonFormatter, RawFormatter, RecordFormat, RecordFormatter};
pub use stats::{DeliveryStats, DeliveryStatsSnapshot};
pub use stream::{DeliveryStream, DeliveryStreamBuilder};
pub use traits::testing;
pub use traits::{
    BatchResponse, FirehoseClient, JsonSchemaValidator, RecordResult, RetryPolicy,
    SchemaValidator, Violation,
};
pub use types::{redshift_timestamp, FormattedRecord, Record};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        BatchResponse, BufferConfig, DeliveryError, DeliveryErrors, DeliveryResult,
        DeliveryStream, DeliveryStreamConfig, FirehoseClient, FormattedRecord,
        QueuableDeliveryStream, Record, RecordFormat, RecordResult, TransportError,
    };

    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
    pub use std::sync::Arc;
}
