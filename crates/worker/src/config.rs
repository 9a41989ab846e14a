//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker pool, retry and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Message groups processed concurrently within a batch (1 = sequential)
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Retries after the first attempt for transient persistence failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `n × retry_backoff_ms`
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
    #[serde(default = "default_dead_letter_timeout_ms")]
    pub dead_letter_timeout_ms: u64,
    #[serde(default = "default_metrics_flush_interval_secs")]
    pub metrics_flush_interval_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_persist_timeout_ms() -> u64 {
    5000
}

fn default_dead_letter_timeout_ms() -> u64 {
    5000
}

fn default_metrics_flush_interval_secs() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            persist_timeout_ms: default_persist_timeout_ms(),
            dead_letter_timeout_ms: default_dead_letter_timeout_ms(),
            metrics_flush_interval_secs: default_metrics_flush_interval_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn dead_letter_timeout(&self) -> Duration {
        Duration::from_millis(self.dead_letter_timeout_ms)
    }

    pub fn metrics_flush_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_flush_interval_secs.max(1))
    }
}
