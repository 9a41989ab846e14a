//! Batch dispatch with bounded concurrency and per-entity ordering.
//!
//! Each batch is prepared in offset order, split into groups of messages
//! that share an entity identity, and the groups are run on at most
//! `workers` tasks. Messages inside a group keep their queue order. The
//! batch is acknowledged only once every message is persisted or
//! dead-lettered; any transport failure leaves it unacknowledged so the
//! queue redelivers it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use ingest_core::{Error, MessageState, Position, QueueMessage, Result, UpsertAction};
use redpanda::MessageQueue;
use telemetry::{health, metrics};

use crate::pipeline::{prepare, MessageOutcome, Pipeline, Prepared, Tracker};

/// Summary of one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub created: usize,
    pub updated: usize,
    pub dead_lettered: usize,
    /// Dead letters that could not be written to the store.
    pub unrecorded: usize,
    pub acknowledged: Option<Position>,
    /// Last state of each message, by offset.
    pub states: Vec<(i64, MessageState)>,
}

impl BatchReport {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Persisted(o) => match o.action {
                UpsertAction::Created => self.created += 1,
                UpsertAction::Updated => self.updated += 1,
            },
            MessageOutcome::DeadLettered { recorded, .. } => {
                self.dead_lettered += 1;
                if !recorded {
                    self.unrecorded += 1;
                }
            }
        }
    }

    pub fn persisted(&self) -> usize {
        self.created + self.updated
    }

    pub fn is_empty(&self) -> bool {
        self.received == 0
    }

    fn record_states(&mut self, trackers: &[Tracker]) {
        self.states = trackers.iter().map(|t| (t.offset(), t.state())).collect();
    }
}

/// Splits prepared messages into groups that share no ordering key with
/// each other. Groups are ordered by their first offset and keep offset order
/// internally.
pub fn group_by_key(prepared: Vec<Prepared>) -> Vec<Vec<Prepared>> {
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..prepared.len()).collect();
    let mut owners: HashMap<String, usize> = HashMap::new();

    for (i, p) in prepared.iter().enumerate() {
        for key in p.ordering_keys() {
            match owners.get(&key) {
                Some(&owner) => {
                    let a = find(&mut parent, owner);
                    let b = find(&mut parent, i);
                    if a != b {
                        // keep the earliest message as the root
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    owners.insert(key, i);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<Prepared>> = BTreeMap::new();
    for (i, p) in prepared.into_iter().enumerate() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(p);
    }
    groups.into_values().collect()
}

/// Pulls batches from the queue and drives them through the pipeline.
pub struct Dispatcher {
    queue: Arc<dyn MessageQueue>,
    pipeline: Arc<Pipeline>,
    workers: usize,
    reconnect_backoff: Duration,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        pipeline: Arc<Pipeline>,
        workers: usize,
        reconnect_backoff: Duration,
    ) -> Self {
        Self {
            queue,
            pipeline,
            workers: workers.max(1),
            reconnect_backoff,
        }
    }

    /// Runs until `shutdown` flips to true or its sender is dropped. A batch
    /// already received is finished and acknowledged before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(workers = self.workers, "Dispatcher starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                r = self.queue.receive() => r,
            };

            let result = match received {
                Ok(messages) => self.process_batch(messages).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(report) => {
                    health().queue.set_healthy();
                    if !report.is_empty() {
                        debug!(?report, "Processed batch");
                    }
                }
                Err(e) => {
                    if e.is_transport() {
                        metrics().transport_errors.inc();
                    }
                    health().queue.set_unhealthy(e.to_string());
                    error!(
                        error = %e,
                        backoff_ms = %self.reconnect_backoff.as_millis(),
                        "Batch failed, rewinding to last acknowledged offset"
                    );
                    self.queue.reset().await;

                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.reconnect_backoff) => {}
                    }
                }
            }
        }

        info!("Dispatcher stopped");
    }

    /// Receives and processes a single batch.
    pub async fn run_once(&self) -> Result<BatchReport> {
        let messages = self.queue.receive().await?;
        self.process_batch(messages).await
    }

    async fn process_batch(&self, messages: Vec<QueueMessage>) -> Result<BatchReport> {
        let (report, acknowledged) = self.dispatch(messages).await;
        acknowledged.map(|()| report)
    }

    /// Drives a received batch to terminal states and acknowledges it.
    ///
    /// The report is returned even when the batch could not be acknowledged,
    /// so the caller can see how far each message got.
    pub async fn dispatch(&self, messages: Vec<QueueMessage>) -> (BatchReport, Result<()>) {
        let Some(last) = messages.iter().map(QueueMessage::position).max() else {
            return (BatchReport::default(), Ok(()));
        };

        let start = Instant::now();
        let mut report = BatchReport {
            received: messages.len(),
            ..BatchReport::default()
        };
        metrics().last_batch_size.set(messages.len() as u64);

        let prepared: Vec<Prepared> = messages.into_iter().map(prepare).collect();
        let groups = group_by_key(prepared);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for group in groups {
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::internal("worker pool closed"))?;
                let mut completed = Vec::with_capacity(group.len());
                for prepared in group {
                    metrics().in_flight.inc();
                    completed.push(pipeline.complete(prepared).await);
                    metrics().in_flight.dec();
                }
                Ok::<_, Error>(completed)
            });
        }

        let mut trackers = Vec::with_capacity(report.received);
        while let Some(joined) = tasks.join_next().await {
            let completed = match joined {
                Ok(Ok(completed)) => completed,
                Ok(Err(e)) => return (report, Err(e)),
                Err(e) => {
                    return (
                        report,
                        Err(Error::internal(format!("worker task failed: {}", e))),
                    )
                }
            };
            for (outcome, tracker) in completed {
                report.record(&outcome);
                trackers.push(tracker);
            }
        }
        trackers.sort_by_key(Tracker::offset);

        if let Some(pending) = trackers.iter().find(|t| !t.state().is_terminal()) {
            let e = Error::internal(format!(
                "message at offset {} finished in state {}",
                pending.offset(),
                pending.state().as_str()
            ));
            report.record_states(&trackers);
            return (report, Err(e));
        }

        if let Err(e) = self.queue.acknowledge(last).await {
            report.record_states(&trackers);
            return (report, Err(e));
        }
        for tracker in &mut trackers {
            tracker.acknowledge();
        }
        report.acknowledged = Some(last);
        report.record_states(&trackers);

        let elapsed = start.elapsed();
        metrics().messages_acknowledged.inc_by(report.received as u64);
        metrics().batches_processed.inc();
        metrics().batch_latency_ms.observe(elapsed.as_millis() as u64);

        info!(
            received = report.received,
            created = report.created,
            updated = report.updated,
            dead_lettered = report.dead_lettered,
            offset = last.offset,
            latency_ms = %elapsed.as_millis(),
            "Acknowledged batch"
        );
        (report, Ok(()))
    }
}
