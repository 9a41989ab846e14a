//! Dead-letter records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::{Error, FailureKind};
use crate::message::QueueMessage;

/// A message set aside with the reason it could not be ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Replay key
    pub id: Uuid,
    pub failure_kind: FailureKind,
    pub reason: String,
    pub entity_kind: Option<EntityKind>,
    pub entity_key: Option<String>,
    /// Original message body, untouched unless `raw_lossy` is set
    pub raw_message: String,
    /// The body was not valid UTF-8 and `raw_message` holds a lossy copy
    pub raw_lossy: bool,
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    /// Persistence attempts made before giving up (0 if never attempted)
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(message: &QueueMessage, failure_kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            failure_kind,
            reason: reason.into(),
            entity_kind: None,
            entity_key: None,
            raw_message: message.payload_lossy(),
            raw_lossy: std::str::from_utf8(&message.payload).is_err(),
            source_topic: message.topic.clone(),
            source_partition: message.partition,
            source_offset: message.offset,
            attempts: 0,
            failed_at: Utc::now(),
        }
    }

    /// Builds a dead letter from the error that terminated the message.
    pub fn from_error(message: &QueueMessage, error: &Error) -> Self {
        let kind = error
            .failure_kind()
            .unwrap_or(FailureKind::PersistenceError);
        Self::new(message, kind, error.to_string())
    }

    pub fn with_entity(mut self, kind: EntityKind, key: Option<String>) -> Self {
        if kind != EntityKind::Unknown {
            self.entity_kind = Some(kind);
        }
        self.entity_key = key;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
