//! Transactional upsert of canonical records.
//!
//! Each upsert runs in one transaction:
//! 1. lock the rows matching the primary key and secondary unique value
//! 2. resolve update-vs-insert with [`ingest_core::resolve`]
//! 3. verify every supplied parent reference exists
//! 4. write only the supplied columns

use std::time::Instant;

use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use tracing::{debug, instrument};

use ingest_core::upsert::missing_insert_reference;
use ingest_core::{
    resolve, CanonicalRecord, ColumnValue, EntityKind, EntitySchema, EntityStore, Error,
    Resolution, Result, UpsertOutcome,
};

use crate::client::PgClient;
use crate::errors::{map_sqlx, map_write_error};

/// Placeholder key reported when a required parent reference is absent.
const MISSING_KEY: &str = "<none>";

/// [`EntityStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgEntityStore {
    client: PgClient,
}

impl PgEntityStore {
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &ColumnValue) {
    match value {
        ColumnValue::Text(v) => builder.push_bind(v.clone()),
        ColumnValue::Integer(v) => builder.push_bind(*v),
        ColumnValue::Float(v) => builder.push_bind(*v),
        ColumnValue::Bool(v) => builder.push_bind(*v),
        ColumnValue::Timestamp(v) => builder.push_bind(*v),
        ColumnValue::Time(v) => builder.push_bind(*v),
    };
}

/// Returns the primary key of the row where `column = value`, locking it.
async fn find_row_for_update(
    conn: &mut PgConnection,
    schema: &EntitySchema,
    column: &str,
    value: &str,
) -> Result<Option<String>> {
    let sql = format!(
        "SELECT {pk} FROM {table} WHERE {column} = $1 FOR UPDATE",
        pk = schema.primary_key.column,
        table = schema.table,
        column = column,
    );
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;

    row.map(|r| r.try_get::<String, _>(0))
        .transpose()
        .map_err(map_sqlx)
}

/// Whether a parent row exists; holds a share lock until commit so the
/// parent cannot disappear under the write.
async fn parent_exists(conn: &mut PgConnection, kind: EntityKind, key: &str) -> Result<bool> {
    let schema = kind
        .schema()
        .ok_or_else(|| Error::internal(format!("no schema for parent {}", kind)))?;
    let sql = format!(
        "SELECT 1 FROM {table} WHERE {pk} = $1 FOR SHARE",
        table = schema.table,
        pk = schema.primary_key.column,
    );
    let row = sqlx::query(&sql)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?;
    Ok(row.is_some())
}

async fn check_references(conn: &mut PgConnection, record: &CanonicalRecord) -> Result<()> {
    for (parent, key) in record.parent_refs() {
        let Some(key) = key else { continue };
        if !parent_exists(conn, parent.parent, key).await? {
            return Err(Error::referential(parent.parent, parent.wire, key));
        }
    }
    Ok(())
}

async fn insert_row(conn: &mut PgConnection, record: &CanonicalRecord, id: &str) -> Result<()> {
    let schema = record.schema();
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} ({}", schema.table, schema.primary_key.column));
    for column in record.columns.keys() {
        builder.push(", ").push(*column);
    }
    builder.push(") VALUES (");
    builder.push_bind(id.to_string());
    for value in record.columns.values() {
        builder.push(", ");
        push_value(&mut builder, value);
    }
    builder.push(")");

    builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, record))?;
    Ok(())
}

async fn update_row(conn: &mut PgConnection, record: &CanonicalRecord, id: &str) -> Result<()> {
    if record.columns.is_empty() {
        return Ok(());
    }
    let schema = record.schema();
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("UPDATE {} SET ", schema.table));
    for (i, (column, value)) in record.columns.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(*column).push(" = ");
        push_value(&mut builder, value);
    }
    builder
        .push(format!(" WHERE {} = ", schema.primary_key.column))
        .push_bind(id.to_string());

    builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, record))?;
    Ok(())
}

#[async_trait]
impl EntityStore for PgEntityStore {
    #[instrument(skip_all, fields(entity = %record.kind, key = record.entity_key().as_deref().unwrap_or("")))]
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
        let schema = record.schema();
        if !schema.writable {
            return Err(Error::validation(
                schema.primary_key.wire,
                format!("{} is read-only", record.kind),
            ));
        }

        let start = Instant::now();
        let mut tx = self.client.pool().begin().await.map_err(map_sqlx)?;

        let by_primary_key = match &record.primary_key {
            Some(pk) => find_row_for_update(&mut tx, schema, schema.primary_key.column, pk).await?,
            None => None,
        };
        let by_secondary = match (schema.secondary_unique, record.secondary_key()) {
            (Some(column), Some(value)) => {
                find_row_for_update(&mut tx, schema, column, value).await?
            }
            _ => None,
        };

        let resolution = resolve(record, by_primary_key, by_secondary)?;

        if let Resolution::Insert(_) = &resolution {
            if let Some(wire) = missing_insert_reference(record) {
                let parent = schema
                    .parents
                    .iter()
                    .find(|p| p.wire == wire)
                    .map(|p| p.parent)
                    .unwrap_or(EntityKind::Unknown);
                return Err(Error::referential(parent, wire, MISSING_KEY));
            }
        }

        check_references(&mut tx, record).await?;

        match &resolution {
            Resolution::Insert(id) => insert_row(&mut tx, record, id).await?,
            Resolution::UpdateByPrimaryKey(id) | Resolution::UpdateBySecondary(id) => {
                update_row(&mut tx, record, id).await?
            }
        }

        tx.commit().await.map_err(map_sqlx)?;

        let elapsed = start.elapsed();
        debug!(
            id = resolution.id(),
            action = ?resolution.action(),
            latency_ms = %elapsed.as_millis(),
            "Upserted record"
        );

        Ok(resolution.into_outcome())
    }

    async fn exists(&self, kind: EntityKind, key: &str) -> Result<bool> {
        let schema = kind
            .schema()
            .ok_or_else(|| Error::unclassified("unknown entity kind"))?;
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1)",
            schema.table, schema.primary_key.column
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(key)
            .fetch_one(self.client.pool())
            .await
            .map_err(map_sqlx)
    }
}
