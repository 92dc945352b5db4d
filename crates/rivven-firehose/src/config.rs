//! Configuration types for rivven-firehose
//!
//! Streams can be configured in code or loaded from YAML:
//!
//! ```yaml
//! stream_name: clickstream
//! format: json
//! max_batch_size: 400
//! max_drains: 3
//! max_retries: 40
//! retry_interval_ms: 1500
//! schema:
//!   type: object
//!   required: [user_id]
//! buffer:
//!   max_buffer_time_ms: 30000
//!   max_buffer_size: 500
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are expanded from the environment before
//! parsing.

use crate::error::{ConfigError, ConfigResult};
use crate::format::RecordFormat;
use crate::scheduler::DEFAULT_MAX_DRAINS;
use crate::traits::batch::DEFAULT_MAX_BATCH_SIZE;
use crate::traits::retry::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use validator::Validate;

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Delivery stream configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate, PartialEq)]
pub struct DeliveryStreamConfig {
    /// Name of the delivery stream on the sink
    #[validate(length(min = 1, max = 64))]
    pub stream_name: String,

    /// Records per batch call (default: 400)
    #[serde(default = "default_max_batch_size")]
    #[validate(range(min = 1, max = 500))]
    pub max_batch_size: usize,

    /// Chunk drains in flight per call (default: 3)
    #[serde(default = "default_max_drains")]
    #[validate(range(min = 1, max = 64))]
    pub max_drains: usize,

    /// Retries for rejected records after the first attempt (default: 40)
    #[serde(default = "default_max_retries")]
    #[validate(range(max = 1000))]
    pub max_retries: u32,

    /// Fixed delay between attempts in milliseconds (default: 1500)
    #[serde(default = "default_retry_interval_ms")]
    #[validate(range(max = 600000))]
    pub retry_interval_ms: u64,

    /// Payload format (default: raw)
    #[serde(default)]
    pub format: RecordFormat,

    /// JSON Schema every record must satisfy (optional)
    #[serde(default)]
    pub schema: Option<Value>,

    /// Time/size buffering (optional)
    #[serde(default)]
    pub buffer: Option<BufferConfig>,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_drains() -> usize {
    DEFAULT_MAX_DRAINS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

/// Buffering thresholds for [`QueuableDeliveryStream`]
///
/// [`QueuableDeliveryStream`]: crate::buffer::QueuableDeliveryStream
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Validate, PartialEq, Eq)]
pub struct BufferConfig {
    /// Flush this long after the first record of a cycle (default: 30000)
    #[serde(default = "default_max_buffer_time_ms")]
    #[validate(range(min = 1, max = 3600000))]
    pub max_buffer_time_ms: u64,

    /// Flush as soon as this many records are queued (default: 500)
    #[serde(default = "default_max_buffer_size")]
    #[validate(range(min = 1))]
    pub max_buffer_size: usize,
}

fn default_max_buffer_time_ms() -> u64 {
    30_000
}

fn default_max_buffer_size() -> usize {
    500
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_time_ms: default_max_buffer_time_ms(),
            max_buffer_size: default_max_buffer_size(),
        }
    }
}

impl BufferConfig {
    pub fn new(max_buffer_time: Duration, max_buffer_size: usize) -> Self {
        Self {
            max_buffer_time_ms: max_buffer_time.as_millis() as u64,
            max_buffer_size,
        }
    }

    pub fn max_buffer_time(&self) -> Duration {
        Duration::from_millis(self.max_buffer_time_ms)
    }
}

impl DeliveryStreamConfig {
    /// Configuration with defaults for the named stream
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            max_batch_size: default_max_batch_size(),
            max_drains: default_max_drains(),
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
            format: RecordFormat::default(),
            schema: None,
            buffer: None,
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let expanded = Self::expand_env_vars(content);
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate_config()?;
        Ok(config)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }

    /// Validate field ranges, including the buffer section
    pub fn validate_config(&self) -> ConfigResult<()> {
        self.validate()?;
        if let Some(buffer) = &self.buffer {
            buffer.validate()?;
        }
        if let Some(schema) = &self.schema {
            if !schema.is_object() && !schema.is_boolean() {
                return Err(ConfigError::Schema(
                    "schema must be a JSON object or boolean".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Retry policy derived from this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, self.retry_interval())
    }
}
