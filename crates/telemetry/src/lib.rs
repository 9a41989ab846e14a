//! Process-wide telemetry for the HR ingestion pipeline.
//!
//! Counters and latency histograms live in memory and are flushed to
//! ClickHouse by the scheduler; component health feeds the startup checks.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
