//! Redpanda producer used to put dead-lettered bodies back on the queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::record::Record;
use tokio::sync::RwLock;
use tracing::{debug, error};

use ingest_core::{Error, Result};

use crate::config::RedpandaConfig;
use crate::connection::connect;
use crate::queue::RecordPublisher;

/// Producer bound to the configured queue partition.
pub struct Producer {
    config: RedpandaConfig,
    topic: String,
    client: RwLock<Option<Arc<PartitionClient>>>,
}

impl Producer {
    pub fn new(config: RedpandaConfig) -> Self {
        let topic = config.consumer.topic();
        Self {
            config,
            topic,
            client: RwLock::new(None),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn get_client(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.client.read().await;
            if let Some(c) = client.as_ref() {
                return Ok(c.clone());
            }
        }

        let client = connect(&self.config).await?;
        let partition_client = client
            .partition_client(
                self.topic.clone(),
                self.config.consumer.partition,
                UnknownTopicHandling::Error,
            )
            .await
            .map_err(|e| Error::transport(format!("Failed to get partition client: {}", e)))?;
        let partition_client = Arc::new(partition_client);

        *self.client.write().await = Some(partition_client.clone());
        Ok(partition_client)
    }

    fn compression(&self) -> Compression {
        match self.config.compression.as_str() {
            "gzip" => Compression::Gzip,
            "snappy" => Compression::Snappy,
            "lz4" => Compression::Lz4,
            "zstd" => Compression::Zstd,
            _ => Compression::NoCompression,
        }
    }
}

#[async_trait]
impl RecordPublisher for Producer {
    async fn publish(&self, key: Option<&str>, payload: &[u8]) -> Result<i64> {
        let client = self.get_client().await?;

        let record = Record {
            key: key.map(|k| k.as_bytes().to_vec()),
            value: Some(payload.to_vec()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        match client.produce(vec![record], self.compression()).await {
            Ok(offsets) => {
                let offset = offsets.first().copied().unwrap_or_default();
                debug!(topic = %self.topic, offset, "Published record");
                Ok(offset)
            }
            Err(e) => {
                error!("Failed to publish to Redpanda: {}", e);
                *self.client.write().await = None;
                Err(Error::transport(format!("Failed to produce: {}", e)))
            }
        }
    }
}
