//! Per-message processing: decode, classify, transform, then persist or
//! dead-letter.
//!
//! [`prepare`] is pure and runs in offset order on the dispatcher task;
//! [`Pipeline::complete`] does the I/O and may run concurrently for
//! messages that share no entity identity.

use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use ingest_core::limits::validate_message_size;
use ingest_core::transform::normalize_id;
use ingest_core::{
    classify, transform, CanonicalRecord, DeadLetter, EntityKind, Error, FailureKind,
    MessageState, QueueMessage, UpsertAction, UpsertOutcome,
};
use telemetry::metrics;

use crate::dead_letter::Recorder;
use crate::persistence::Persister;

/// Tracks one message through its processing states.
#[derive(Debug)]
pub struct Tracker {
    offset: i64,
    state: MessageState,
    started: Instant,
}

impl Tracker {
    fn new(offset: i64) -> Self {
        Self {
            offset,
            state: MessageState::Received,
            started: Instant::now(),
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    /// Marks a terminal message as acknowledged by the queue.
    pub(crate) fn acknowledge(&mut self) {
        self.advance(MessageState::Acknowledged);
    }

    fn advance(&mut self, next: MessageState) {
        if !self.state.can_transition_to(next) {
            warn!(
                offset = self.offset,
                from = self.state.as_str(),
                to = next.as_str(),
                "Unexpected message state transition"
            );
        }
        debug!(offset = self.offset, state = next.as_str(), "Message state");
        self.state = next;
    }

    fn finish(&mut self, next: MessageState) {
        self.advance(next);
        metrics()
            .message_latency_ms
            .observe(self.started.elapsed().as_millis() as u64);
    }
}

/// A message after the pure stages.
#[derive(Debug)]
pub enum Prepared {
    /// Transformed and ready to persist.
    Ready {
        message: QueueMessage,
        record: CanonicalRecord,
        tracker: Tracker,
    },
    /// Failed before persistence.
    Rejected {
        message: QueueMessage,
        letter: DeadLetter,
        tracker: Tracker,
    },
}

impl Prepared {
    pub fn message(&self) -> &QueueMessage {
        match self {
            Self::Ready { message, .. } | Self::Rejected { message, .. } => message,
        }
    }

    pub fn offset(&self) -> i64 {
        self.message().offset
    }

    /// Entity locks the message will take; empty for rejected messages.
    pub fn lock_keys(&self) -> Vec<String> {
        match self {
            Self::Ready { record, .. } => record.lock_keys(),
            Self::Rejected { .. } => Vec::new(),
        }
    }

    /// Keys that order this message against others in the same batch: its
    /// own locks plus the parents it references.
    pub fn ordering_keys(&self) -> Vec<String> {
        match self {
            Self::Ready { record, .. } => {
                let mut keys = record.lock_keys();
                keys.extend(record.parent_lock_keys());
                keys
            }
            Self::Rejected { .. } => Vec::new(),
        }
    }
}

/// Terminal result for a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Persisted(UpsertOutcome),
    DeadLettered {
        kind: FailureKind,
        /// False when the dead-letter store could not be written.
        recorded: bool,
    },
}

impl MessageOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted(_))
    }
}

fn decode(message: &QueueMessage) -> Result<Map<String, Value>, Error> {
    validate_message_size(&message.payload)?;
    let text = std::str::from_utf8(&message.payload)
        .map_err(|e| Error::unclassified(format!("message body is not UTF-8: {}", e)))?;
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::unclassified("message body is not a JSON object")),
        Err(e) => Err(Error::unclassified(format!("message body is not JSON: {}", e))),
    }
}

/// Best-effort identity read straight from the wire record, used when a
/// record fails before a canonical key exists.
fn raw_key(kind: EntityKind, record: &Map<String, Value>) -> Option<String> {
    let schema = kind.schema()?;
    let secondary_wire = schema.secondary_unique.and_then(|column| {
        schema
            .parents
            .iter()
            .find(|p| p.column == column)
            .map(|p| p.wire)
    });
    [Some(schema.primary_key.wire), secondary_wire]
        .into_iter()
        .flatten()
        .find_map(|wire| normalize_id(wire, record.get(wire)?).ok())
}

/// Runs the pure stages for a message.
pub fn prepare(message: QueueMessage) -> Prepared {
    let mut tracker = Tracker::new(message.offset);

    let record = match decode(&message) {
        Ok(record) => record,
        Err(e) => {
            tracker.advance(MessageState::Failed);
            let letter = DeadLetter::from_error(&message, &e);
            return Prepared::Rejected {
                message,
                letter,
                tracker,
            };
        }
    };

    let kind = classify(&record);
    if kind == EntityKind::Unknown {
        tracker.advance(MessageState::Failed);
        let letter = DeadLetter::new(
            &message,
            FailureKind::Unclassified,
            "record matches no known entity schema",
        );
        return Prepared::Rejected {
            message,
            letter,
            tracker,
        };
    }
    tracker.advance(MessageState::Classified);

    match transform(kind, &record) {
        Ok(canonical) => {
            tracker.advance(MessageState::Transformed);
            Prepared::Ready {
                message,
                record: canonical,
                tracker,
            }
        }
        Err(e) => {
            tracker.advance(MessageState::Failed);
            let letter =
                DeadLetter::from_error(&message, &e).with_entity(kind, raw_key(kind, &record));
            Prepared::Rejected {
                message,
                letter,
                tracker,
            }
        }
    }
}

/// The I/O half of message processing.
pub struct Pipeline {
    persister: Persister,
    recorder: Recorder,
}

impl Pipeline {
    pub fn new(persister: Persister, recorder: Recorder) -> Self {
        Self {
            persister,
            recorder,
        }
    }

    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    /// Drives a prepared message to a terminal state. The tracker is handed
    /// back so the caller can record the acknowledgement.
    pub async fn complete(&self, prepared: Prepared) -> (MessageOutcome, Tracker) {
        match prepared {
            Prepared::Rejected {
                letter,
                mut tracker,
                ..
            } => {
                let outcome = self.dead_letter(letter, &mut tracker).await;
                (outcome, tracker)
            }
            Prepared::Ready {
                message,
                record,
                mut tracker,
            } => match self.persister.persist(&record).await {
                Ok(persisted) => {
                    match persisted.outcome.action {
                        UpsertAction::Created => metrics().records_created.inc(),
                        UpsertAction::Updated => metrics().records_updated.inc(),
                    }
                    debug!(
                        offset = message.offset,
                        entity = %record.kind,
                        id = %persisted.outcome.id,
                        action = ?persisted.outcome.action,
                        attempts = persisted.attempts,
                        "Persisted record"
                    );
                    tracker.finish(MessageState::Persisted);
                    (MessageOutcome::Persisted(persisted.outcome), tracker)
                }
                Err(failure) => {
                    tracker.advance(MessageState::Failed);
                    let letter = DeadLetter::from_error(&message, &failure.error)
                        .with_entity(record.kind, record.entity_key())
                        .with_attempts(failure.attempts);
                    let outcome = self.dead_letter(letter, &mut tracker).await;
                    (outcome, tracker)
                }
            },
        }
    }

    /// Prepares and completes a single message.
    pub async fn process(&self, message: QueueMessage) -> MessageOutcome {
        self.complete(prepare(message)).await.0
    }

    async fn dead_letter(&self, letter: DeadLetter, tracker: &mut Tracker) -> MessageOutcome {
        let kind = letter.failure_kind;
        let recorded = self.recorder.record(&letter).await.is_some();
        tracker.finish(MessageState::DeadLettered);
        MessageOutcome::DeadLettered { kind, recorded }
    }
}
