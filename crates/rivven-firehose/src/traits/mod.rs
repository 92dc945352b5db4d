//! Core delivery traits and building blocks
//!
//! - `FirehoseClient` - Submit bounded batches to the ingestion service
//! - `SchemaValidator` - Check records before they are submitted
//! - `batch` - Split formatted records into bounded chunks
//! - `retry` - Fixed-delay retry policy and per-chunk retry state
//! - `testing` - Scripted in-memory firehose for tests

pub mod batch;
pub mod retry;
pub mod sink;
pub mod testing;
pub mod validator;

// Re-export sink types
pub use sink::{BatchResponse, FirehoseClient, RecordResult};

// Re-export batch types
pub use batch::{split_into_chunks, Chunk, ChunkEntry, DEFAULT_MAX_BATCH_SIZE};

// Re-export retry types
pub use retry::{RetryPolicy, RetryState, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL};

// Re-export validation types
pub use validator::{validate_all, JsonSchemaValidator, SchemaValidator, Violation};

// Re-export testing utilities
pub use testing::{MockFirehose, RecordedBatch};
