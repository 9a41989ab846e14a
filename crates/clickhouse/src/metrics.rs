//! Pipeline metric snapshots.

use clickhouse::Row;
use serde::Serialize;
use telemetry::MetricsSnapshot;

use ingest_core::{Error, Result};

use crate::client::ClickHouseClient;
use crate::schema::METRICS_TABLE;

/// Row in the `ingestion_metrics` table.
#[derive(Debug, Clone, Row, Serialize)]
pub struct MetricsRow {
    pub timestamp: i64,
    pub messages_received: u64,
    pub messages_acknowledged: u64,
    pub batches_processed: u64,
    pub transport_errors: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub dead_lettered_unclassified: u64,
    pub dead_lettered_validation: u64,
    pub dead_lettered_referential: u64,
    pub dead_lettered_persistence: u64,
    pub dead_letter_failures: u64,
    pub persistence_retries: u64,
    pub messages_replayed: u64,
    pub message_latency_mean_ms: f64,
    pub persist_latency_mean_ms: f64,
    pub batch_latency_mean_ms: f64,
    pub in_flight: u64,
}

impl From<MetricsSnapshot> for MetricsRow {
    fn from(s: MetricsSnapshot) -> Self {
        Self {
            timestamp: s.timestamp.timestamp_millis(),
            messages_received: s.messages_received,
            messages_acknowledged: s.messages_acknowledged,
            batches_processed: s.batches_processed,
            transport_errors: s.transport_errors,
            records_created: s.records_created,
            records_updated: s.records_updated,
            dead_lettered_unclassified: s.dead_lettered_unclassified,
            dead_lettered_validation: s.dead_lettered_validation,
            dead_lettered_referential: s.dead_lettered_referential,
            dead_lettered_persistence: s.dead_lettered_persistence,
            dead_letter_failures: s.dead_letter_failures,
            persistence_retries: s.persistence_retries,
            messages_replayed: s.messages_replayed,
            message_latency_mean_ms: s.message_latency_mean_ms,
            persist_latency_mean_ms: s.persist_latency_mean_ms,
            batch_latency_mean_ms: s.batch_latency_mean_ms,
            in_flight: s.in_flight,
        }
    }
}

/// Insert a metrics snapshot.
pub async fn insert_metrics(client: &ClickHouseClient, snapshot: MetricsSnapshot) -> Result<()> {
    let row = MetricsRow::from(snapshot);

    let mut insert = client
        .inner()
        .insert(METRICS_TABLE)
        .map_err(|e| Error::internal(format!("Insert error: {}", e)))?;

    insert
        .write(&row)
        .await
        .map_err(|e| Error::internal(format!("Write error: {}", e)))?;

    insert
        .end()
        .await
        .map_err(|e| Error::internal(format!("End error: {}", e)))?;

    Ok(())
}
