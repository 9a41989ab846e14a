//! Core types for HR record ingestion: entity catalogue, classification,
//! transformation, upsert policy and dead-letter model.

pub mod classify;
pub mod dead_letter;
pub mod entity;
pub mod error;
pub mod field;
pub mod limits;
pub mod message;
pub mod record;
pub mod store;
pub mod transform;
pub mod upsert;

pub use classify::classify;
pub use dead_letter::DeadLetter;
pub use entity::{EntityKind, EntitySchema};
pub use error::{Error, FailureKind, Result};
pub use field::{ColumnType, ColumnValue, Field};
pub use message::{MessageState, Position, QueueMessage};
pub use record::CanonicalRecord;
pub use store::{DeadLetterSink, EntityStore, OffsetStore};
pub use transform::transform;
pub use upsert::{resolve, Resolution, UpsertAction, UpsertOutcome};
