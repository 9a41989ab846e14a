//! Redpanda configuration.

use serde::{Deserialize, Serialize};

use crate::topics::queue_topic;

/// Broker connection plus consumer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// SASL/SCRAM-SHA-256 username; TLS is enabled when credentials are set
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Compression for replayed records (none, gzip, lz4, snappy, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

fn default_compression() -> String {
    "none".to_string()
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            sasl_username: None,
            sasl_password: None,
            compression: default_compression(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

/// Where a consumer with no stored offset begins reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StartFrom {
    #[default]
    Earliest,
    Latest,
}

/// Queue consumer configuration.
///
/// The queue is the topic `<exchange>.<queue>`; one consumer owns one
/// partition of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Name under which offsets are stored
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default)]
    pub partition: i32,
    /// Maximum messages handed to the dispatcher per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum time a fetch waits for records
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: i32,
    #[serde(default)]
    pub start_from: StartFrom,
    /// Delay before reconnecting after a transport error
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// Partitions used when the queue is declared
    #[serde(default = "default_topic_partitions")]
    pub topic_partitions: i32,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,
}

fn default_group_id() -> String {
    "hr-ingest".to_string()
}

fn default_exchange() -> String {
    "hrms".to_string()
}

fn default_queue() -> String {
    "records".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

fn default_max_fetch_bytes() -> i32 {
    4 * 1024 * 1024
}

fn default_reconnect_backoff_ms() -> u64 {
    2000
}

fn default_topic_partitions() -> i32 {
    1
}

fn default_replication_factor() -> i16 {
    1
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            exchange: default_exchange(),
            queue: default_queue(),
            partition: 0,
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_fetch_bytes: default_max_fetch_bytes(),
            start_from: StartFrom::default(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            topic_partitions: default_topic_partitions(),
            replication_factor: default_replication_factor(),
        }
    }
}

impl ConsumerConfig {
    /// Topic backing the configured queue.
    pub fn topic(&self) -> String {
        queue_topic(&self.exchange, &self.queue)
    }
}
