//! Redpanda queue access for HR record ingestion.

pub mod config;
pub mod connection;
pub mod consumer;
pub mod health;
pub mod producer;
pub mod queue;
pub mod topics;

pub use config::*;
pub use consumer::*;
pub use producer::*;
pub use queue::*;
pub use topics::*;
