//! Delivery stream
//!
//! [`DeliveryStream`] runs one `put_records` call through the full pipeline:
//! schema validation, formatting, chunking, bounded-concurrency drains and
//! error aggregation. A call resolves `Ok(())` only when every record was
//! accepted by the sink; otherwise it returns every record that did not make
//! it, schema failures first, then sink failures in chunk order.
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_firehose::prelude::*;
//!
//! let stream = DeliveryStream::builder("clickstream", client)
//!     .format(RecordFormat::Json)
//!     .schema(json!({"type": "object", "required": ["user_id"]}))
//!     .build()?;
//!
//! if let Err(errors) = stream.put_records(records).await {
//!     requeue(errors.original_records());
//! }
//! ```

use crate::config::DeliveryStreamConfig;
use crate::drain::Drainer;
use crate::error::{ConfigError, ConfigResult, DeliveryErrors, DeliveryResult};
use crate::format::{RecordFormat, RecordFormatter};
use crate::scheduler::DrainScheduler;
use crate::stats::{DeliveryStats, DeliveryStatsSnapshot};
use crate::traits::batch::{split_into_chunks, ChunkEntry};
use crate::traits::sink::FirehoseClient;
use crate::traits::validator::{validate_all, JsonSchemaValidator, SchemaValidator};
use crate::types::Record;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Batching, validating and retrying delivery to one named stream
pub struct DeliveryStream {
    config: DeliveryStreamConfig,
    client: Arc<dyn FirehoseClient>,
    validator: Arc<dyn SchemaValidator>,
    formatter: Arc<dyn RecordFormatter>,
    stats: Arc<DeliveryStats>,
}

impl std::fmt::Debug for DeliveryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryStream")
            .field("config", &self.config)
            .field("formatter", &self.formatter.name())
            .finish_non_exhaustive()
    }
}

impl DeliveryStream {
    /// Start building a stream for `stream_name`
    pub fn builder(
        stream_name: impl Into<String>,
        client: Arc<dyn FirehoseClient>,
    ) -> DeliveryStreamBuilder {
        DeliveryStreamBuilder::new(stream_name, client)
    }

    /// Raw-format stream with default settings
    pub fn new(
        stream_name: impl Into<String>,
        client: Arc<dyn FirehoseClient>,
    ) -> ConfigResult<Self> {
        Self::builder(stream_name, client).build()
    }

    /// JSON-format stream with default settings
    pub fn json(
        stream_name: impl Into<String>,
        client: Arc<dyn FirehoseClient>,
    ) -> ConfigResult<Self> {
        Self::builder(stream_name, client)
            .format(RecordFormat::Json)
            .build()
    }

    /// Build a stream from a loaded configuration
    pub fn from_config(
        config: DeliveryStreamConfig,
        client: Arc<dyn FirehoseClient>,
    ) -> ConfigResult<Self> {
        Self::builder(config.stream_name.clone(), client)
            .config(config)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.config.stream_name
    }

    pub fn config(&self) -> &DeliveryStreamConfig {
        &self.config
    }

    /// Snapshot of the delivery counters
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Deliver a single record
    pub async fn put_record(&self, record: Record) -> DeliveryResult<()> {
        self.put_records(vec![record]).await
    }

    /// Deliver a batch of records
    ///
    /// An empty batch resolves immediately without contacting the sink.
    pub async fn put_records(&self, records: Vec<Record>) -> DeliveryResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let received = records.len();
        DeliveryStats::add(&self.stats.records_received, received);

        let (valid, mut errors) = validate_all(
            records,
            self.config.schema.as_ref(),
            self.validator.as_ref(),
        );
        if !errors.is_empty() {
            DeliveryStats::add(&self.stats.records_invalid, errors.len());
            counter!("firehose.records.invalid").increment(errors.len() as u64);
            debug!(
                "Stream '{}' {} of {} record(s) failed schema validation",
                self.name(),
                errors.len(),
                received
            );
        }

        let entries: Vec<ChunkEntry> = valid
            .into_iter()
            .map(|record| ChunkEntry {
                formatted: self.formatter.format(&record),
                record,
            })
            .collect();
        let chunks = split_into_chunks(entries, self.config.max_batch_size);

        if !chunks.is_empty() {
            debug!(
                "Stream '{}' delivering {} record(s) in {} chunk(s)",
                self.name(),
                received - errors.len(),
                chunks.len()
            );

            let drainer = Drainer::new(
                &self.config.stream_name,
                self.client.as_ref(),
                self.formatter.as_ref(),
                self.config.retry_policy(),
                &self.stats,
            );
            let scheduler = DrainScheduler::new(drainer, self.config.max_drains, &self.stats);
            errors.extend(scheduler.run(chunks).await);
        }

        if errors.is_empty() {
            debug!("Stream '{}' delivered {} record(s)", self.name(), received);
            return Ok(());
        }

        let errors = DeliveryErrors::new(errors);
        warn!("Stream '{}' {}", self.name(), errors);
        Err(errors)
    }
}

/// Builder for [`DeliveryStream`]
pub struct DeliveryStreamBuilder {
    config: DeliveryStreamConfig,
    client: Arc<dyn FirehoseClient>,
    validator: Option<Arc<dyn SchemaValidator>>,
}

impl DeliveryStreamBuilder {
    pub fn new(stream_name: impl Into<String>, client: Arc<dyn FirehoseClient>) -> Self {
        Self {
            config: DeliveryStreamConfig::new(stream_name),
            client,
            validator: None,
        }
    }

    /// Replace the whole configuration, stream name included
    pub fn config(mut self, config: DeliveryStreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate every record against this JSON Schema
    pub fn schema(mut self, schema: Value) -> Self {
        self.config.schema = Some(schema);
        self
    }

    pub fn format(mut self, format: RecordFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.config.max_batch_size = max_batch_size;
        self
    }

    pub fn max_drains(mut self, max_drains: usize) -> Self {
        self.config.max_drains = max_drains;
        self
    }

    /// Use a custom schema validator instead of [`JsonSchemaValidator`]
    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Validate the configuration and schema, then build the stream
    pub fn build(self) -> ConfigResult<DeliveryStream> {
        self.config.validate_config()?;

        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(JsonSchemaValidator::new()));
        if let Some(schema) = &self.config.schema {
            validator.check_schema(schema).map_err(ConfigError::Schema)?;
        }

        let formatter = self.config.format.formatter();
        info!(
            "Delivery stream '{}' ready (format: {}, max_batch_size: {}, max_drains: {}, max_retries: {})",
            self.config.stream_name,
            formatter.name(),
            self.config.max_batch_size,
            self.config.max_drains,
            self.config.max_retries
        );

        Ok(DeliveryStream {
            config: self.config,
            client: self.client,
            validator,
            formatter,
            stats: Arc::new(DeliveryStats::new()),
        })
    }
}
