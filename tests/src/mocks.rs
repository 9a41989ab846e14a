//! In-memory implementations of the pipeline seams.
//!
//! Each mock implements the same trait as its production counterpart, so
//! the worker code under test runs unchanged.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ingest_core::upsert::missing_insert_reference;
use ingest_core::{
    resolve, CanonicalRecord, ColumnValue, DeadLetter, DeadLetterSink, EntityKind, EntityStore,
    Error, Position, QueueMessage, Resolution, Result, UpsertOutcome,
};
use redpanda::{MessageQueue, RecordPublisher};

use crate::fixtures;

/// Stored row: column name to value, primary key column included.
pub type Row = BTreeMap<String, ColumnValue>;

/// Entity store with the same resolution and referential rules as the
/// PostgreSQL store, applied atomically under one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<&'static str, BTreeMap<String, Row>>>,
    failures: Mutex<Vec<Error>>,
    delay: Mutex<Duration>,
    upserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a lookup row, e.g. a bank in the bank master.
    pub fn seed(&self, kind: EntityKind, key: &str) {
        let Some(schema) = kind.schema() else { return };
        let mut row = Row::new();
        row.insert(
            schema.primary_key.column.to_string(),
            ColumnValue::Text(Some(key.to_string())),
        );
        self.tables
            .lock()
            .entry(schema.table)
            .or_default()
            .insert(key.to_string(), row);
    }

    /// Errors returned by the next upserts, in order.
    pub fn fail_next(&self, errors: Vec<Error>) {
        self.failures.lock().extend(errors);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn row(&self, kind: EntityKind, key: &str) -> Option<Row> {
        let schema = kind.schema()?;
        self.tables.lock().get(schema.table)?.get(key).cloned()
    }

    pub fn rows(&self, kind: EntityKind) -> Vec<Row> {
        let Some(schema) = kind.schema() else {
            return Vec::new();
        };
        self.tables
            .lock()
            .get(schema.table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.rows(kind).len()
    }

    /// Snapshot of every table, for comparing store states.
    pub fn dump(&self) -> BTreeMap<String, BTreeMap<String, Row>> {
        self.tables
            .lock()
            .iter()
            .map(|(table, rows)| (table.to_string(), rows.clone()))
            .collect()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn apply(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
        let schema = record.schema();
        if !schema.writable {
            return Err(Error::validation(
                schema.primary_key.wire,
                format!("{} is read-only", record.kind),
            ));
        }

        let mut tables = self.tables.lock();

        let table = tables.get(schema.table);
        let by_primary_key = record
            .primary_key
            .as_ref()
            .filter(|pk| table.is_some_and(|t| t.contains_key(*pk)))
            .cloned();
        let by_secondary = match (schema.secondary_unique, record.secondary_key()) {
            (Some(column), Some(value)) => table.and_then(|t| {
                t.iter()
                    .find(|(_, row)| {
                        row.get(column).and_then(ColumnValue::as_text) == Some(value)
                    })
                    .map(|(key, _)| key.clone())
            }),
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
                return Err(Error::referential(parent, wire, "<none>"));
            }
        }

        for (parent, key) in record.parent_refs() {
            let Some(key) = key else { continue };
            let parent_table = parent.parent.schema().map(|s| s.table);
            let exists = parent_table
                .and_then(|t| tables.get(t))
                .is_some_and(|rows| rows.contains_key(key));
            if !exists {
                return Err(Error::referential(parent.parent, parent.wire, key));
            }
        }

        let rows = tables.entry(schema.table).or_default();
        let id = resolution.id().to_string();
        let row = rows.entry(id.clone()).or_insert_with(|| {
            let mut row = Row::new();
            row.insert(
                schema.primary_key.column.to_string(),
                ColumnValue::Text(Some(id.clone())),
            );
            row
        });
        for (column, value) in &record.columns {
            row.insert(column.to_string(), value.clone());
        }

        Ok(resolution.into_outcome())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome> {
        self.upserts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let injected = {
            let mut failures = self.failures.lock();
            (!failures.is_empty()).then(|| failures.remove(0))
        };
        if let Some(e) = injected {
            return Err(e);
        }

        self.apply(record)
    }

    async fn exists(&self, kind: EntityKind, key: &str) -> Result<bool> {
        Ok(self.row(kind, key).is_some())
    }
}

/// Dead-letter sink that keeps letters in memory.
#[derive(Default)]
pub struct MemoryDeadLetters {
    letters: Mutex<Vec<DeadLetter>>,
    should_fail: Mutex<bool>,
}

impl MemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.letters.lock().len()
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetters {
    async fn record(&self, letter: &DeadLetter) -> Result<String> {
        if *self.should_fail.lock() {
            return Err(Error::transient("Mock dead-letter store failure"));
        }
        self.letters.lock().push(letter.clone());
        Ok(letter.id.to_string())
    }
}

/// Single-partition queue with explicit acknowledgement.
///
/// Publishing appends to the same log, so replayed dead letters come back
/// through `receive`.
pub struct MockQueue {
    log: Mutex<Vec<QueueMessage>>,
    batch_size: usize,
    committed: AtomicI64,
    cursor: AtomicI64,
    receive_failures: Mutex<u32>,
    ack_failures: Mutex<u32>,
    publish_fails: Mutex<bool>,
    acks: Mutex<Vec<Position>>,
    resets: AtomicUsize,
}

impl MockQueue {
    pub fn new(batch_size: usize) -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            batch_size,
            committed: AtomicI64::new(0),
            cursor: AtomicI64::new(0),
            receive_failures: Mutex::new(0),
            ack_failures: Mutex::new(0),
            publish_fails: Mutex::new(false),
            acks: Mutex::new(Vec::new()),
            resets: AtomicUsize::new(0),
        }
    }

    /// Appends a message body and returns its offset.
    pub fn push(&self, body: &serde_json::Value) -> i64 {
        self.push_raw(body.to_string().into_bytes(), None)
    }

    pub fn push_raw(&self, payload: Vec<u8>, key: Option<&str>) -> i64 {
        let mut log = self.log.lock();
        let offset = log.len() as i64;
        let mut message = fixtures::raw_message(offset, payload);
        message.key = key.map(str::to_string);
        log.push(message);
        offset
    }

    /// Makes the next `n` receives fail with a transport error.
    pub fn fail_receives(&self, n: u32) {
        *self.receive_failures.lock() = n;
    }

    /// Makes the next `n` acknowledgements fail with a transport error.
    pub fn fail_acks(&self, n: u32) {
        *self.ack_failures.lock() = n;
    }

    pub fn set_publish_fails(&self, fail: bool) {
        *self.publish_fails.lock() = fail;
    }

    /// Next offset after the last acknowledged message.
    pub fn committed(&self) -> i64 {
        self.committed.load(Ordering::SeqCst)
    }

    /// Messages not yet acknowledged.
    pub fn unacknowledged(&self) -> usize {
        let total = self.log.lock().len() as i64;
        (total - self.committed()).max(0) as usize
    }

    pub fn acks(&self) -> Vec<Position> {
        self.acks.lock().clone()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn read_from(&self, from: i64, limit: usize) -> Vec<QueueMessage> {
        self.log
            .lock()
            .iter()
            .filter(|m| m.offset >= from)
            .take(limit)
            .cloned()
            .collect()
    }

    fn take_failure(counter: &Mutex<u32>) -> bool {
        let mut remaining = counter.lock();
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl MessageQueue for MockQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        if Self::take_failure(&self.receive_failures) {
            return Err(Error::transport("Mock queue connection lost"));
        }
        let messages = self.read_from(self.cursor.load(Ordering::SeqCst), self.batch_size);
        match messages.last() {
            Some(last) => self.cursor.store(last.offset + 1, Ordering::SeqCst),
            // stand-in for the broker's fetch wait
            None => tokio::time::sleep(Duration::from_millis(5)).await,
        }
        Ok(messages)
    }

    async fn peek(&self, limit: usize) -> Result<Vec<QueueMessage>> {
        Ok(self.read_from(self.committed(), limit))
    }

    async fn acknowledge(&self, position: Position) -> Result<()> {
        if Self::take_failure(&self.ack_failures) {
            return Err(Error::transport("Mock offset commit failure"));
        }
        self.committed
            .fetch_max(position.next_offset(), Ordering::SeqCst);
        self.acks.lock().push(position);
        Ok(())
    }

    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.cursor.store(self.committed(), Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordPublisher for MockQueue {
    async fn publish(&self, key: Option<&str>, payload: &[u8]) -> Result<i64> {
        if *self.publish_fails.lock() {
            return Err(Error::transport("Mock publish failure"));
        }
        Ok(self.push_raw(payload.to_vec(), key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_queue_redelivers_after_reset() {
        let queue = MockQueue::new(10);
        queue.push(&json!({"org_id": "o1"}));
        queue.push(&json!({"org_id": "o2"}));

        assert_eq!(queue.receive().await.unwrap().len(), 2);
        assert!(queue.receive().await.unwrap().is_empty());

        queue.reset().await;
        assert_eq!(queue.receive().await.unwrap().len(), 2);
        assert_eq!(queue.unacknowledged(), 2);
    }
}
