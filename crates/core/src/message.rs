//! Queue messages and their processing states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message read from the durable queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl QueueMessage {
    /// Payload as text; invalid UTF-8 is replaced so the body can still be
    /// dead-lettered.
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Position to acknowledge once this message is done.
    pub fn position(&self) -> Position {
        Position {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Queue position of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub partition: i32,
    pub offset: i64,
}

impl Position {
    /// Offset the consumer resumes from after acknowledging this position.
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}

/// Processing state of a single message.
///
/// `Received → Classified → Transformed → Persisted → Acknowledged`, with
/// `Failed → DeadLettered → Acknowledged` reachable from any working stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Received,
    Classified,
    Transformed,
    Persisted,
    Failed,
    DeadLettered,
    Acknowledged,
}

impl MessageState {
    pub fn can_transition_to(self, next: MessageState) -> bool {
        use MessageState::*;
        matches!(
            (self, next),
            (Received, Classified)
                | (Classified, Transformed)
                | (Transformed, Persisted)
                | (Persisted, Acknowledged)
                | (Received | Classified | Transformed, Failed)
                | (Failed, DeadLettered)
                | (DeadLettered, Acknowledged)
        )
    }

    /// States after which the message may be acknowledged.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Persisted | Self::DeadLettered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Transformed => "transformed",
            Self::Persisted => "persisted",
            Self::Failed => "failed",
            Self::DeadLettered => "dead_lettered",
            Self::Acknowledged => "acknowledged",
        }
    }
}
