//! Queue seams used by the dispatcher and the replay tool.

use async_trait::async_trait;

use ingest_core::{Position, QueueMessage, Result};

/// A durable, at-least-once message queue.
///
/// Messages handed out by `receive` stay unacknowledged until
/// `acknowledge` is called for a position at or after theirs; after a
/// `reset` they are delivered again.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Waits up to the batch timeout and returns the next batch, possibly
    /// empty.
    async fn receive(&self) -> Result<Vec<QueueMessage>>;

    /// Returns up to `limit` unacknowledged messages without consuming them.
    async fn peek(&self, limit: usize) -> Result<Vec<QueueMessage>>;

    /// Acknowledges every message up to and including `position`.
    async fn acknowledge(&self, position: Position) -> Result<()>;

    /// Drops the connection and rewinds to the last acknowledged position.
    async fn reset(&self);
}

/// Publishes raw message bodies onto the ingestion queue.
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    /// Returns the offset assigned to the published message.
    async fn publish(&self, key: Option<&str>, payload: &[u8]) -> Result<i64>;
}
