//! Seams between the pipeline and its external collaborators.
//!
//! Production implementations live in `postgres-store` and
//! `clickhouse-client`; the integration tests provide in-memory ones.

use async_trait::async_trait;

use crate::dead_letter::DeadLetter;
use crate::entity::EntityKind;
use crate::error::Result;
use crate::record::CanonicalRecord;
use crate::upsert::UpsertOutcome;

/// Relational store for canonical records.
///
/// `upsert` must apply [`crate::upsert::resolve`] and the referential checks
/// inside a single transaction.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome>;

    async fn exists(&self, kind: EntityKind, key: &str) -> Result<bool>;
}

/// Append-only failure store.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Appends a dead letter and returns its id.
    async fn record(&self, letter: &DeadLetter) -> Result<String>;
}

/// Durable consumer offsets, so a restart resumes after the last
/// acknowledged message.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn load(&self, group_id: &str, topic: &str, partition: i32) -> Result<Option<i64>>;

    async fn save(&self, group_id: &str, topic: &str, partition: i32, next_offset: i64)
        -> Result<()>;
}
