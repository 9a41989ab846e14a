//! Wiring of the real worker pipeline over test doubles.

use std::sync::Arc;
use std::time::Duration;

use ingest_core::{EntityKind, Result};
use postgres_store::{PgClient, PgEntityStore, PostgresConfig};
use redpanda::MessageQueue;
use worker::{BatchReport, Dispatcher, Persister, Pipeline, PipelineConfig, Recorder};

use crate::containers::TestDatabase;
use crate::mocks::{MemoryDeadLetters, MemoryStore, MockQueue};
use crate::schema::all_statements;

/// Bank seeded in every harness's bank master.
pub const BANK_ID: &str = "BANK-HDFC";

/// Short timeouts and backoffs so failure paths run quickly.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        workers: 4,
        max_retries: 2,
        retry_backoff_ms: 1,
        persist_timeout_ms: 200,
        dead_letter_timeout_ms: 200,
        metrics_flush_interval_secs: 60,
    }
}

/// Queue, stores, pipeline and dispatcher, all in memory.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub dead_letters: Arc<MemoryDeadLetters>,
    pub queue: Arc<MockQueue>,
    pub pipeline: Arc<Pipeline>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config(), 50)
    }

    pub fn with_config(config: PipelineConfig, batch_size: usize) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.seed(EntityKind::BankMaster, BANK_ID);
        let dead_letters = Arc::new(MemoryDeadLetters::new());
        let queue = Arc::new(MockQueue::new(batch_size));

        let pipeline = Arc::new(Pipeline::new(
            Persister::new(store.clone(), &config),
            Recorder::new(dead_letters.clone(), config.dead_letter_timeout()),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            queue.clone() as Arc<dyn MessageQueue>,
            pipeline.clone(),
            config.workers(),
            Duration::from_millis(5),
        ));

        Self {
            store,
            dead_letters,
            queue,
            pipeline,
            dispatcher,
        }
    }

    /// Processes batches until every queued message is acknowledged.
    pub async fn drain(&self) -> Result<BatchReport> {
        let mut total = BatchReport::default();
        while self.queue.unacknowledged() > 0 {
            let report = self.dispatcher.run_once().await?;
            total.received += report.received;
            total.created += report.created;
            total.updated += report.updated;
            total.dead_lettered += report.dead_lettered;
            total.unrecorded += report.unrecorded;
            total.acknowledged = report.acknowledged.or(total.acknowledged);
            total.states.extend(report.states);
        }
        Ok(total)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// A PostgreSQL-backed entity store on a fresh schema.
pub struct PgHarness {
    pub database: TestDatabase,
    pub client: PgClient,
    pub store: Arc<PgEntityStore>,
}

impl PgHarness {
    pub async fn new() -> Self {
        let database = TestDatabase::start().await;
        let client = PgClient::connect(PostgresConfig {
            url: database.url.clone(),
            ..PostgresConfig::default()
        })
        .await
        .expect("Failed to connect to PostgreSQL");

        for statement in all_statements() {
            sqlx::query(&statement)
                .execute(client.pool())
                .await
                .expect("Failed to apply schema");
        }
        sqlx::query(
            "INSERT INTO bank_master (bank_id, bank_name, bank_code) VALUES ($1, 'HDFC Bank', 'HDFC') \
             ON CONFLICT (bank_id) DO NOTHING",
        )
        .bind(BANK_ID)
        .execute(client.pool())
        .await
        .expect("Failed to seed bank master");

        let store = Arc::new(PgEntityStore::new(client.clone()));
        Self {
            database,
            client,
            store,
        }
    }

    pub fn pipeline(&self, dead_letters: Arc<MemoryDeadLetters>) -> Pipeline {
        let config = test_config();
        Pipeline::new(
            Persister::new(self.store.clone(), &config),
            Recorder::new(dead_letters, config.dead_letter_timeout()),
        )
    }
}
