//! PostgreSQL persistence for HR record ingestion.

pub mod client;
pub mod config;
pub mod errors;
pub mod health;
pub mod offsets;
pub mod upsert;

pub use client::*;
pub use config::*;
pub use offsets::PgOffsetStore;
pub use upsert::PgEntityStore;
