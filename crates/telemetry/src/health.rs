//! Health check aggregation.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

const NEVER_CHECKED: u64 = u64::MAX;

/// Health status for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Component health state.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    /// Whether ingestion can make progress without this component.
    required: bool,
    healthy: AtomicBool,
    message: parking_lot::RwLock<Option<String>>,
    /// Latency of the last connectivity probe
    check_ms: AtomicU64,
}

impl ComponentHealth {
    pub const fn new(name: &'static str, required: bool) -> Self {
        Self {
            name,
            required,
            healthy: AtomicBool::new(false),
            message: parking_lot::RwLock::new(None),
            check_ms: AtomicU64::new(NEVER_CHECKED),
        }
    }

    /// Records the result of a connectivity check and how long it took.
    pub fn record_check(&self, result: Result<(), String>, latency: Duration) {
        self.check_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
        match result {
            Ok(()) => self.set_healthy(),
            Err(msg) => self.set_unhealthy(msg),
        }
    }

    pub fn last_check_ms(&self) -> Option<u64> {
        match self.check_ms.load(Ordering::Relaxed) {
            NEVER_CHECKED => None,
            ms => Some(ms),
        }
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.message.write() = None;
    }

    pub fn set_unhealthy(&self, msg: impl Into<String>) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.message.write() = Some(msg.into());
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> Option<String> {
        self.message.read().clone()
    }

    fn report(&self) -> ComponentHealthReport {
        ComponentHealthReport {
            name: self.name.to_string(),
            required: self.required,
            healthy: self.is_healthy(),
            message: self.message(),
            last_check_ms: self.last_check_ms(),
        }
    }
}

/// Aggregated health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub required: bool,
    pub healthy: bool,
    pub message: Option<String>,
    pub last_check_ms: Option<u64>,
}

/// Global health registry.
///
/// The queue and entity store are required; the dead-letter store only
/// degrades the pipeline since failed messages are still acknowledged.
pub struct HealthRegistry {
    pub queue: ComponentHealth,
    pub postgres: ComponentHealth,
    pub clickhouse: ComponentHealth,
}

impl HealthRegistry {
    pub const fn new() -> Self {
        Self {
            queue: ComponentHealth::new("redpanda", true),
            postgres: ComponentHealth::new("postgres", true),
            clickhouse: ComponentHealth::new("clickhouse", false),
        }
    }

    fn components(&self) -> [&ComponentHealth; 3] {
        [&self.queue, &self.postgres, &self.clickhouse]
    }

    /// Generate a health report.
    pub fn report(&self) -> HealthReport {
        let components: Vec<_> = self.components().iter().map(|c| c.report()).collect();

        let status = if components.iter().all(|c| c.healthy) {
            HealthStatus::Healthy
        } else if self.is_ready() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        HealthReport { status, components }
    }

    /// Whether every required component is healthy.
    pub fn is_ready(&self) -> bool {
        self.components()
            .iter()
            .filter(|c| c.is_required())
            .all(|c| c.is_healthy())
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global health registry.
pub static HEALTH: std::sync::LazyLock<HealthRegistry> =
    std::sync::LazyLock::new(HealthRegistry::new);

/// Get the global health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
