//! Resubmits dead-lettered messages to the ingestion queue.
//!
//! The original body is republished untouched, so it goes through the full
//! pipeline again; the upsert policy makes a repeat harmless.

use tracing::{info, warn};
use uuid::Uuid;

use ingest_core::DeadLetter;
use redpanda::RecordPublisher;
use telemetry::metrics;

/// Outcome of a replay run.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Dead-letter id and the offset it was republished at.
    pub resubmitted: Vec<(Uuid, i64)>,
    pub failed: Vec<(Uuid, String)>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Republishes each dead letter's raw message, keyed by its entity key.
/// A failed publish is reported and the rest continue. Letters whose body
/// was not stored intact are never republished.
pub async fn replay(publisher: &dyn RecordPublisher, letters: &[DeadLetter]) -> ReplayReport {
    let mut report = ReplayReport::default();

    for letter in letters {
        if letter.raw_lossy {
            warn!(id = %letter.id, "Skipping dead letter with a non-UTF-8 body");
            report
                .failed
                .push((letter.id, "original body was not UTF-8".to_string()));
            continue;
        }
        match publisher
            .publish(letter.entity_key.as_deref(), letter.raw_message.as_bytes())
            .await
        {
            Ok(offset) => {
                metrics().messages_replayed.inc();
                info!(
                    id = %letter.id,
                    failure_kind = %letter.failure_kind,
                    source_offset = letter.source_offset,
                    offset,
                    "Replayed dead letter"
                );
                report.resubmitted.push((letter.id, offset));
            }
            Err(e) => {
                warn!(id = %letter.id, error = %e, "Failed to replay dead letter");
                report.failed.push((letter.id, e.to_string()));
            }
        }
    }

    report
}
