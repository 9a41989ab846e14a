//! Dead-letter sink and operator queries.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use ingest_core::{DeadLetter, DeadLetterSink, EntityKind, Error, FailureKind, Result};

use crate::client::ClickHouseClient;
use crate::schema::DEAD_LETTERS_TABLE;

const COLUMNS: &str = "id, failure_kind, failure_code, reason, entity_kind, entity_key, \
    raw_message, raw_lossy, source_topic, source_partition, source_offset, attempts, failed_at";

/// Row in the `dead_letters` table.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct DeadLetterRow {
    pub id: String,
    pub failure_kind: String,
    pub failure_code: String,
    pub reason: String,
    pub entity_kind: Option<String>,
    pub entity_key: Option<String>,
    pub raw_message: String,
    pub raw_lossy: bool,
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub attempts: u32,
    pub failed_at: i64, // milliseconds since epoch
}

impl From<&DeadLetter> for DeadLetterRow {
    fn from(letter: &DeadLetter) -> Self {
        Self {
            id: letter.id.to_string(),
            failure_kind: letter.failure_kind.as_str().to_string(),
            failure_code: letter.failure_kind.code().to_string(),
            reason: letter.reason.clone(),
            entity_kind: letter.entity_kind.map(|k| k.as_str().to_string()),
            entity_key: letter.entity_key.clone(),
            raw_message: letter.raw_message.clone(),
            raw_lossy: letter.raw_lossy,
            source_topic: letter.source_topic.clone(),
            source_partition: letter.source_partition,
            source_offset: letter.source_offset,
            attempts: letter.attempts,
            failed_at: letter.failed_at.timestamp_millis(),
        }
    }
}

impl TryFrom<DeadLetterRow> for DeadLetter {
    type Error = Error;

    fn try_from(row: DeadLetterRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| Error::internal(format!("bad dead letter id {}: {}", row.id, e)))?;
        let failure_kind = FailureKind::parse(&row.failure_kind).ok_or_else(|| {
            Error::internal(format!("unknown failure kind {}", row.failure_kind))
        })?;
        let failed_at = Utc
            .timestamp_millis_opt(row.failed_at)
            .single()
            .ok_or_else(|| Error::internal(format!("bad timestamp {}", row.failed_at)))?;

        Ok(DeadLetter {
            id,
            failure_kind,
            reason: row.reason,
            entity_kind: row.entity_kind.as_deref().and_then(EntityKind::parse),
            entity_key: row.entity_key,
            raw_message: row.raw_message,
            raw_lossy: row.raw_lossy,
            source_topic: row.source_topic,
            source_partition: row.source_partition,
            source_offset: row.source_offset,
            attempts: row.attempts,
            failed_at,
        })
    }
}

/// Dead letters per failure kind.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct KindCount {
    pub failure_kind: String,
    pub count: u64,
}

/// [`DeadLetterSink`] writing to the append-only `dead_letters` table.
#[derive(Clone)]
pub struct ClickHouseDeadLetterSink {
    client: ClickHouseClient,
}

impl ClickHouseDeadLetterSink {
    pub fn new(client: ClickHouseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeadLetterSink for ClickHouseDeadLetterSink {
    async fn record(&self, letter: &DeadLetter) -> Result<String> {
        let start = Instant::now();
        let row = DeadLetterRow::from(letter);

        let mut insert = self
            .client
            .inner()
            .insert(DEAD_LETTERS_TABLE)
            .map_err(|e| Error::transient(format!("Insert error: {}", e)))?;

        insert
            .write(&row)
            .await
            .map_err(|e| Error::transient(format!("Write error: {}", e)))?;

        insert
            .end()
            .await
            .map_err(|e| Error::transient(format!("End error: {}", e)))?;

        debug!(
            id = %row.id,
            failure_kind = %row.failure_kind,
            latency_ms = %start.elapsed().as_millis(),
            "Recorded dead letter"
        );

        Ok(row.id)
    }
}

/// Count dead letters per failure kind.
pub async fn count_by_kind(client: &ClickHouseClient) -> Result<Vec<KindCount>> {
    client
        .inner()
        .query(&format!(
            "SELECT failure_kind, count() AS count FROM {} GROUP BY failure_kind ORDER BY failure_kind",
            DEAD_LETTERS_TABLE
        ))
        .fetch_all::<KindCount>()
        .await
        .map_err(|e| Error::internal(format!("Query error: {}", e)))
}

/// Most recent dead letters, optionally of one kind.
pub async fn list_recent(
    client: &ClickHouseClient,
    kind: Option<FailureKind>,
    limit: u64,
) -> Result<Vec<DeadLetter>> {
    let query = match kind {
        Some(kind) => client
            .inner()
            .query(&format!(
                "SELECT {} FROM {} WHERE failure_kind = ? ORDER BY failed_at DESC LIMIT ?",
                COLUMNS, DEAD_LETTERS_TABLE
            ))
            .bind(kind.as_str())
            .bind(limit),
        None => client
            .inner()
            .query(&format!(
                "SELECT {} FROM {} ORDER BY failed_at DESC LIMIT ?",
                COLUMNS, DEAD_LETTERS_TABLE
            ))
            .bind(limit),
    };

    let rows = query
        .fetch_all::<DeadLetterRow>()
        .await
        .map_err(|e| Error::internal(format!("Query error: {}", e)))?;

    rows.into_iter().map(DeadLetter::try_from).collect()
}

/// Dead letters with the given ids, oldest first.
pub async fn fetch_by_ids(client: &ClickHouseClient, ids: &[Uuid]) -> Result<Vec<DeadLetter>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();

    let rows = client
        .inner()
        .query(&format!(
            "SELECT {} FROM {} WHERE has(?, id) ORDER BY failed_at",
            COLUMNS, DEAD_LETTERS_TABLE
        ))
        .bind(ids)
        .fetch_all::<DeadLetterRow>()
        .await
        .map_err(|e| Error::internal(format!("Query error: {}", e)))?;

    rows.into_iter().map(DeadLetter::try_from).collect()
}
