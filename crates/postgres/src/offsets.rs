//! Consumer offsets stored in PostgreSQL.

use async_trait::async_trait;

use ingest_core::{Error, OffsetStore, Result};

use crate::client::PgClient;

pub const CREATE_CONSUMER_OFFSETS: &str = r#"
CREATE TABLE IF NOT EXISTS consumer_offsets (
    group_id    TEXT        NOT NULL,
    topic       TEXT        NOT NULL,
    partition   INTEGER     NOT NULL,
    next_offset BIGINT      NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (group_id, topic, partition)
)
"#;

/// [`OffsetStore`] backed by the `consumer_offsets` table.
///
/// Failures surface as transport errors so the dispatcher treats a failed
/// commit like a lost queue connection.
#[derive(Clone)]
pub struct PgOffsetStore {
    client: PgClient,
}

impl PgOffsetStore {
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }

    /// Creates the offsets table if it does not exist.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_CONSUMER_OFFSETS)
            .execute(self.client.pool())
            .await
            .map_err(|e| Error::transport(format!("Failed to create offsets table: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl OffsetStore for PgOffsetStore {
    async fn load(&self, group_id: &str, topic: &str, partition: i32) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT next_offset FROM consumer_offsets \
             WHERE group_id = $1 AND topic = $2 AND partition = $3",
        )
        .bind(group_id)
        .bind(topic)
        .bind(partition)
        .fetch_optional(self.client.pool())
        .await
        .map_err(|e| Error::transport(format!("Failed to load offset: {}", e)))
    }

    async fn save(
        &self,
        group_id: &str,
        topic: &str,
        partition: i32,
        next_offset: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consumer_offsets (group_id, topic, partition, next_offset)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_id, topic, partition)
            DO UPDATE SET next_offset = EXCLUDED.next_offset, updated_at = now()
            "#,
        )
        .bind(group_id)
        .bind(topic)
        .bind(partition)
        .bind(next_offset)
        .execute(self.client.pool())
        .await
        .map_err(|e| Error::transport(format!("Failed to commit offset: {}", e)))?;
        Ok(())
    }
}
