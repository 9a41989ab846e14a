//! Redpanda consumer for the ingestion queue.
//!
//! Uses rskafka for Kafka-compatible consumption with:
//! - Offsets persisted through an [`OffsetStore`] for at-least-once delivery
//! - Batch fetching bounded by size and timeout
//! - Rewind to the last acknowledged offset on connection reset

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::error::{Error as KafkaError, ProtocolError};
use rskafka::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::record::RecordAndOffset;
use telemetry::metrics;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use ingest_core::{Error, OffsetStore, Position, QueueMessage, Result};

use crate::config::{ConsumerConfig, RedpandaConfig, StartFrom};
use crate::connection::connect;
use crate::queue::MessageQueue;

const UNSET: i64 = -1;

/// Consumer for one partition of the ingestion queue.
pub struct Consumer {
    config: RedpandaConfig,
    topic: String,
    offsets: Arc<dyn OffsetStore>,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    /// Next offset after the last acknowledged message
    committed: AtomicI64,
    /// Next offset to fetch
    cursor: AtomicI64,
}

impl Consumer {
    /// Creates a new consumer; the connection is opened lazily.
    pub fn new(config: RedpandaConfig, offsets: Arc<dyn OffsetStore>) -> Self {
        let topic = config.consumer.topic();
        info!(
            group_id = %config.consumer.group_id,
            topic = %topic,
            partition = config.consumer.partition,
            batch_size = config.consumer.batch_size,
            "Creating Redpanda consumer"
        );

        Self {
            config,
            topic,
            offsets,
            partition_client: RwLock::new(None),
            committed: AtomicI64::new(UNSET),
            cursor: AtomicI64::new(UNSET),
        }
    }

    fn consumer_config(&self) -> &ConsumerConfig {
        &self.config.consumer
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the connected partition client, connecting and restoring
    /// the committed offset on first use.
    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let mut guard = self.partition_client.write().await;
        if let Some(ref c) = *guard {
            return Ok(c.clone());
        }

        let client = connect(&self.config).await?;
        let partition_client = client
            .partition_client(
                self.topic.clone(),
                self.consumer_config().partition,
                UnknownTopicHandling::Error,
            )
            .await
            .map_err(|e| Error::transport(format!("Failed to get partition client: {}", e)))?;
        let partition_client = Arc::new(partition_client);

        if self.committed.load(Ordering::SeqCst) == UNSET {
            let start = self.initial_offset(&partition_client).await?;
            self.committed.store(start, Ordering::SeqCst);
            info!(
                topic = %self.topic,
                partition = self.consumer_config().partition,
                offset = start,
                "Consumer initialized at offset"
            );
        }
        self.cursor
            .store(self.committed.load(Ordering::SeqCst), Ordering::SeqCst);

        *guard = Some(partition_client.clone());
        Ok(partition_client)
    }

    async fn initial_offset(&self, client: &PartitionClient) -> Result<i64> {
        let cfg = self.consumer_config();
        if let Some(stored) = self
            .offsets
            .load(&cfg.group_id, &self.topic, cfg.partition)
            .await?
        {
            return Ok(stored);
        }

        let at = match cfg.start_from {
            StartFrom::Earliest => OffsetAt::Earliest,
            StartFrom::Latest => OffsetAt::Latest,
        };
        client
            .get_offset(at)
            .await
            .map_err(|e| Error::transport(format!("Failed to get offset: {}", e)))
    }

    /// Fetches up to `limit` records starting at `from`.
    async fn fetch_from(&self, from: i64, limit: usize) -> Result<Vec<QueueMessage>> {
        let client = self.ensure_connected().await?;
        let cfg = self.consumer_config();
        let max_wait_ms = cfg.batch_timeout_ms.min(i32::MAX as u64) as i32;

        let fetched = client
            .fetch_records(from, 1..cfg.max_fetch_bytes, max_wait_ms)
            .await;

        let records = match fetched {
            Ok((records, _high_watermark)) => records,
            Err(KafkaError::ServerError {
                protocol_error: ProtocolError::OffsetOutOfRange,
                ..
            }) => {
                let earliest = client
                    .get_offset(OffsetAt::Earliest)
                    .await
                    .map_err(|e| Error::transport(format!("Failed to get offset: {}", e)))?;
                warn!(
                    topic = %self.topic,
                    requested = from,
                    earliest,
                    "Offset out of range, skipping to earliest retained"
                );
                self.committed.store(earliest, Ordering::SeqCst);
                self.cursor.store(earliest, Ordering::SeqCst);
                return Ok(Vec::new());
            }
            Err(e) => {
                error!("Fetch error: {}", e);
                return Err(Error::transport(format!("Failed to fetch records: {}", e)));
            }
        };

        Ok(records
            .into_iter()
            // compressed batches may start before the requested offset
            .filter(|r| r.offset >= from)
            .take(limit)
            .map(|r| self.to_message(r))
            .collect())
    }

    fn to_message(&self, record: RecordAndOffset) -> QueueMessage {
        QueueMessage {
            topic: self.topic.clone(),
            partition: self.consumer_config().partition,
            offset: record.offset,
            key: record
                .record
                .key
                .map(|k| String::from_utf8_lossy(&k).into_owned()),
            payload: record.record.value.unwrap_or_default(),
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
impl MessageQueue for Consumer {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        self.ensure_connected().await?;
        let start = std::time::Instant::now();
        let from = self.cursor.load(Ordering::SeqCst);

        let messages = self
            .fetch_from(from, self.consumer_config().batch_size)
            .await?;

        if let Some(last) = messages.last() {
            self.cursor.store(last.offset + 1, Ordering::SeqCst);
            metrics().messages_received.inc_by(messages.len() as u64);
            debug!(
                messages = messages.len(),
                offset_start = from,
                offset_end = last.offset,
                latency_ms = %start.elapsed().as_millis(),
                "Fetched batch from Redpanda"
            );
        }

        Ok(messages)
    }

    async fn peek(&self, limit: usize) -> Result<Vec<QueueMessage>> {
        self.ensure_connected().await?;
        let from = self.committed.load(Ordering::SeqCst);
        self.fetch_from(from, limit).await
    }

    async fn acknowledge(&self, position: Position) -> Result<()> {
        let cfg = self.consumer_config();
        let next = position.next_offset();

        self.offsets
            .save(&cfg.group_id, &self.topic, position.partition, next)
            .await?;

        let prev = self.committed.swap(next, Ordering::SeqCst);
        debug!(
            partition = position.partition,
            prev_offset = prev,
            new_offset = next,
            "Committed offset"
        );
        Ok(())
    }

    async fn reset(&self) {
        let mut client = self.partition_client.write().await;
        *client = None;
        self.cursor
            .store(self.committed.load(Ordering::SeqCst), Ordering::SeqCst);
        info!(
            topic = %self.topic,
            offset = self.committed.load(Ordering::SeqCst),
            "Consumer connection reset"
        );
    }
}
