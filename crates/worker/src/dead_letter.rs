//! Bounded dead-letter recording.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use ingest_core::{DeadLetter, DeadLetterSink};
use telemetry::metrics;

/// Records dead letters under a timeout; never fails the caller.
pub struct Recorder {
    sink: Arc<dyn DeadLetterSink>,
    timeout: Duration,
}

impl Recorder {
    pub fn new(sink: Arc<dyn DeadLetterSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Returns the stored id, or `None` when recording failed. Failures are
    /// logged with the full reason and queue position.
    pub async fn record(&self, letter: &DeadLetter) -> Option<String> {
        metrics().dead_letters.inc(letter.failure_kind.as_str());
        warn!(
            offset = letter.source_offset,
            partition = letter.source_partition,
            entity = letter.entity_kind.map(|k| k.as_str()).unwrap_or("Unknown"),
            key = letter.entity_key.as_deref().unwrap_or(""),
            failure_kind = %letter.failure_kind,
            code = letter.failure_kind.code(),
            reason = %letter.reason,
            "Dead-lettering message"
        );

        let result = tokio::time::timeout(self.timeout, self.sink.record(letter)).await;
        match result {
            Ok(Ok(id)) => Some(id),
            Ok(Err(e)) => {
                self.log_failure(letter, &e.to_string());
                None
            }
            Err(_) => {
                self.log_failure(
                    letter,
                    &format!("timed out after {}ms", self.timeout.as_millis()),
                );
                None
            }
        }
    }

    fn log_failure(&self, letter: &DeadLetter, cause: &str) {
        metrics().dead_letter_failures.inc();
        error!(
            id = %letter.id,
            topic = %letter.source_topic,
            offset = letter.source_offset,
            failure_kind = %letter.failure_kind,
            reason = %letter.reason,
            raw_message = %letter.raw_message,
            cause,
            "Failed to record dead letter; acknowledging anyway"
        );
    }
}
