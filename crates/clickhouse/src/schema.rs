//! ClickHouse table schemas.
//!
//! - LowCardinality for enum-like columns
//! - DateTime64(3) for millisecond precision
//! - Dead letters are append-only; replay reads them, never mutates them

use ingest_core::{Error, Result};

use crate::client::ClickHouseClient;

pub const DEAD_LETTERS_TABLE: &str = "dead_letters";
pub const METRICS_TABLE: &str = "ingestion_metrics";

pub fn create_database(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", database)
}

/// Failed messages with their classification and queue position.
pub fn create_dead_letters_table(database: &str, ttl_days: u32) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {database}.{DEAD_LETTERS_TABLE} (
    id String,
    failure_kind LowCardinality(String),
    failure_code LowCardinality(String),
    reason String,
    entity_kind Nullable(String),
    entity_key Nullable(String),
    raw_message String,
    raw_lossy Bool DEFAULT false,
    source_topic LowCardinality(String),
    source_partition Int32,
    source_offset Int64,
    attempts UInt32,
    failed_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(failed_at)
ORDER BY (failure_kind, failed_at, id)
TTL toDateTime(failed_at) + INTERVAL {ttl_days} DAY
SETTINGS index_granularity = 8192
"#
    )
}

/// Periodic pipeline metric snapshots.
pub fn create_metrics_table(database: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {database}.{METRICS_TABLE} (
    timestamp DateTime64(3),
    messages_received UInt64,
    messages_acknowledged UInt64,
    batches_processed UInt64,
    transport_errors UInt64,
    records_created UInt64,
    records_updated UInt64,
    dead_lettered_unclassified UInt64,
    dead_lettered_validation UInt64,
    dead_lettered_referential UInt64,
    dead_lettered_persistence UInt64,
    dead_letter_failures UInt64,
    persistence_retries UInt64,
    messages_replayed UInt64,
    message_latency_mean_ms Float64,
    persist_latency_mean_ms Float64,
    batch_latency_mean_ms Float64,
    in_flight UInt64
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY timestamp
TTL toDateTime(timestamp) + INTERVAL 30 DAY
SETTINGS index_granularity = 8192
"#
    )
}

/// All creation statements for a database, in execution order.
pub fn all_statements(database: &str, dead_letter_ttl_days: u32) -> Vec<String> {
    vec![
        create_database(database),
        create_dead_letters_table(database, dead_letter_ttl_days),
        create_metrics_table(database),
    ]
}

/// Initialize the database schema.
///
/// Creates the database and all tables if they don't exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let config = client.config();
    for sql in all_statements(&config.database, config.dead_letter_ttl_days) {
        client
            .inner()
            .query(&sql)
            .execute()
            .await
            .map_err(|e| Error::internal(format!("Schema init error: {}", e)))?;
    }
    Ok(())
}
