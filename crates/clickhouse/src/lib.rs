//! ClickHouse storage for dead letters and pipeline metrics.

pub mod client;
pub mod config;
pub mod dead_letter;
pub mod health;
pub mod metrics;
pub mod schema;

pub use client::*;
pub use config::*;
pub use dead_letter::{ClickHouseDeadLetterSink, DeadLetterRow, KindCount};
pub use schema::init_schema;
