//! Queue naming and declaration.

use rskafka::client::Client;
use tracing::info;

use ingest_core::{Error, Result};

use crate::config::ConsumerConfig;

/// Topic name for a queue bound to an exchange.
pub fn queue_topic(exchange: &str, queue: &str) -> String {
    format!("{}.{}", exchange.trim(), queue.trim())
}

/// Topic settings used when declaring a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    pub timeout_ms: i32,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: 1,
            replication_factor: 1,
            timeout_ms: 5_000,
        }
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_replication(mut self, factor: i16) -> Self {
        self.replication_factor = factor;
        self
    }

    pub fn for_consumer(config: &ConsumerConfig) -> Self {
        Self::new(config.topic())
            .with_partitions(config.topic_partitions.max(config.partition + 1))
            .with_replication(config.replication_factor)
    }
}

/// Creates the queue's topic unless it already exists.
///
/// Returns `true` when the topic was created.
pub async fn declare_queue(client: &Client, topic: &TopicConfig) -> Result<bool> {
    let existing = client
        .list_topics()
        .await
        .map_err(|e| Error::transport(format!("Failed to list topics: {}", e)))?;

    if existing.iter().any(|t| t.name == topic.name) {
        return Ok(false);
    }

    let controller = client
        .controller_client()
        .map_err(|e| Error::transport(format!("Failed to get controller client: {}", e)))?;

    controller
        .create_topic(
            topic.name.clone(),
            topic.partitions,
            topic.replication_factor,
            topic.timeout_ms,
        )
        .await
        .map_err(|e| Error::transport(format!("Failed to declare queue {}: {}", topic.name, e)))?;

    info!(
        topic = %topic.name,
        partitions = topic.partitions,
        "Declared queue"
    );
    Ok(true)
}
