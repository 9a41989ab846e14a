//! Pipeline metrics.
//!
//! Collected in-memory; the scheduler periodically flushes a snapshot to
//! ClickHouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns (upper bound, count) per bucket.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Dead-letter counts split by failure kind.
#[derive(Debug, Default)]
pub struct DeadLetterCounters {
    pub unclassified: Counter,
    pub validation: Counter,
    pub referential: Counter,
    pub persistence: Counter,
}

impl DeadLetterCounters {
    /// Increments the counter for a failure kind name; unknown names count
    /// as persistence failures.
    pub fn inc(&self, kind: &str) {
        match kind {
            "Unclassified" => self.unclassified.inc(),
            "ValidationError" => self.validation.inc(),
            "ReferentialError" => self.referential.inc(),
            _ => self.persistence.inc(),
        }
    }

    pub fn total(&self) -> u64 {
        self.unclassified.get() + self.validation.get() + self.referential.get() + self.persistence.get()
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Queue
    pub messages_received: Counter,
    pub messages_acknowledged: Counter,
    pub batches_processed: Counter,
    pub transport_errors: Counter,

    // Outcomes
    pub records_created: Counter,
    pub records_updated: Counter,
    pub dead_letters: DeadLetterCounters,
    pub dead_letter_failures: Counter,
    pub persistence_retries: Counter,
    pub messages_replayed: Counter,

    // Latency
    pub message_latency_ms: Histogram,
    pub persist_latency_ms: Histogram,
    pub batch_latency_ms: Histogram,

    // Gauges
    pub in_flight: Gauge,
    pub last_batch_size: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_persisted(&self) -> u64 {
        self.records_created.get() + self.records_updated.get()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
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

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            messages_received: self.messages_received.get(),
            messages_acknowledged: self.messages_acknowledged.get(),
            batches_processed: self.batches_processed.get(),
            transport_errors: self.transport_errors.get(),
            records_created: self.records_created.get(),
            records_updated: self.records_updated.get(),
            dead_lettered_unclassified: self.dead_letters.unclassified.get(),
            dead_lettered_validation: self.dead_letters.validation.get(),
            dead_lettered_referential: self.dead_letters.referential.get(),
            dead_lettered_persistence: self.dead_letters.persistence.get(),
            dead_letter_failures: self.dead_letter_failures.get(),
            persistence_retries: self.persistence_retries.get(),
            messages_replayed: self.messages_replayed.get(),
            message_latency_mean_ms: self.message_latency_ms.mean(),
            persist_latency_mean_ms: self.persist_latency_ms.mean(),
            batch_latency_mean_ms: self.batch_latency_ms.mean(),
            in_flight: self.in_flight.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
