//! Serialized, bounded, retried upserts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use ingest_core::{CanonicalRecord, EntityStore, Error, UpsertOutcome};
use telemetry::metrics;

use crate::config::PipelineConfig;
use crate::locks::KeyLocks;

/// A successful upsert and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted {
    pub outcome: UpsertOutcome,
    pub attempts: u32,
}

/// The error that ended persistence and how many attempts were made.
#[derive(Debug)]
pub struct PersistFailure {
    pub error: Error,
    pub attempts: u32,
}

/// Runs upserts under per-key locks with a timeout and linear-backoff
/// retries for transient failures.
pub struct Persister {
    store: Arc<dyn EntityStore>,
    locks: Arc<KeyLocks>,
    max_retries: u32,
    retry_backoff: Duration,
    timeout: Duration,
}

impl Persister {
    pub fn new(store: Arc<dyn EntityStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            locks: Arc::new(KeyLocks::new()),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            timeout: config.persist_timeout(),
        }
    }

    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    pub async fn persist(&self, record: &CanonicalRecord) -> Result<Persisted, PersistFailure> {
        let keys = record.lock_keys();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                let backoff = self.retry_backoff * (attempt - 1);
                metrics().persistence_retries.inc();
                tokio::time::sleep(backoff).await;
            }

            let start = Instant::now();
            let result = {
                let _guard = self.locks.acquire(&keys).await;
                tokio::time::timeout(self.timeout, self.store.upsert(record))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::transient(format!(
                            "upsert timed out after {}ms",
                            self.timeout.as_millis()
                        )))
                    })
            };
            metrics()
                .persist_latency_ms
                .observe(start.elapsed().as_millis() as u64);

            match result {
                Ok(outcome) => {
                    return Ok(Persisted {
                        outcome,
                        attempts: attempt,
                    })
                }
                Err(error) if error.is_transient() && attempt <= self.max_retries => {
                    warn!(
                        entity = %record.kind,
                        key = record.entity_key().as_deref().unwrap_or(""),
                        attempt,
                        error = %error,
                        "Retrying upsert"
                    );
                }
                Err(error) => {
                    return Err(PersistFailure {
                        error,
                        attempts: attempt,
                    })
                }
            }
        }
    }
}
