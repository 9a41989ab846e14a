//! Dispatcher failure handling: retries, dead-letter store outages,
//! transport errors and shutdown.

use std::time::Duration;

use ingest_core::{EntityKind, Error, FailureKind, MessageState};
use integration_tests::fixtures;
use integration_tests::harness::{test_config, Harness};
use redpanda::MessageQueue;
use tokio::sync::watch;
use worker::PipelineConfig;

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let h = Harness::new();
    h.store.fail_next(vec![
        Error::transient("connection reset"),
        Error::transient("pool timed out"),
    ]);
    h.queue.push(&fixtures::organization("ORG-1"));

    let report = h.drain().await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(h.store.upsert_calls(), 3);
    assert_eq!(h.dead_letters.count(), 0);
}

#[tokio::test]
async fn test_exhausted_retries_dead_letter_as_persistence_error() {
    let h = Harness::new();
    h.store.fail_next((0..5).map(|_| Error::transient("database down")).collect());
    h.queue.push(&fixtures::organization("ORG-1"));

    let report = h.drain().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    // max_retries = 2 after the first attempt
    assert_eq!(h.store.upsert_calls(), 3);

    let letters = h.dead_letters.letters();
    assert_eq!(letters[0].failure_kind, FailureKind::PersistenceError);
    assert_eq!(letters[0].attempts, 3);
    assert_eq!(letters[0].entity_key.as_deref(), Some("ORG-1"));
    assert_eq!(h.queue.unacknowledged(), 0);
}

#[tokio::test]
async fn test_slow_store_times_out_and_dead_letters() {
    let h = Harness::new();
    h.store.set_delay(Duration::from_millis(500));
    h.queue.push(&fixtures::organization("ORG-1"));

    let report = h.drain().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    let letters = h.dead_letters.letters();
    assert_eq!(letters[0].failure_kind, FailureKind::PersistenceError);
    assert!(letters[0].reason.contains("timed out"));
}

#[tokio::test]
async fn test_dead_letter_store_outage_still_acknowledges() {
    let h = Harness::new();
    h.dead_letters.set_should_fail(true);
    h.queue.push_raw(b"garbage".to_vec(), None);
    h.queue.push(&fixtures::organization("ORG-1"));

    let report = h.drain().await.unwrap();
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.unrecorded, 1);
    assert_eq!(report.created, 1);
    assert_eq!(h.queue.unacknowledged(), 0);
    assert_eq!(h.dead_letters.count(), 0);
}

#[tokio::test]
async fn test_transport_error_acknowledges_nothing() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.fail_receives(1);

    assert!(h.dispatcher.run_once().await.is_err());
    assert!(h.queue.acks().is_empty());
    assert_eq!(h.store.upsert_calls(), 0);

    h.drain().await.unwrap();
    assert_eq!(h.queue.acks().len(), 1);
    assert!(h.store.row(EntityKind::Organization, "ORG-1").is_some());
}

#[tokio::test]
async fn test_acknowledged_batch_marks_every_message_acknowledged() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.push_raw(b"garbage".to_vec(), None);
    h.queue.push(&fixtures::organization("ORG-2"));

    let report = h.dispatcher.run_once().await.unwrap();
    assert_eq!(report.acknowledged.map(|p| p.offset), Some(2));
    assert_eq!(
        report.states,
        vec![
            (0, MessageState::Acknowledged),
            (1, MessageState::Acknowledged),
            (2, MessageState::Acknowledged),
        ]
    );
}

#[tokio::test]
async fn test_failed_acknowledgement_leaves_messages_terminal() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.push_raw(b"garbage".to_vec(), None);
    h.queue.fail_acks(1);

    let messages = h.queue.receive().await.unwrap();
    let (report, acknowledged) = h.dispatcher.dispatch(messages).await;

    assert!(acknowledged.is_err());
    assert_eq!(report.acknowledged, None);
    assert_eq!(
        report.states,
        vec![(0, MessageState::Persisted), (1, MessageState::DeadLettered)]
    );
    assert!(h.queue.acks().is_empty());
    assert_eq!(h.queue.unacknowledged(), 2);
}

#[tokio::test]
async fn test_run_loop_resets_and_recovers_after_transport_errors() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.fail_receives(2);

    let (tx, rx) = watch::channel(false);
    let dispatcher = h.dispatcher.clone();
    let handle = tokio::spawn(async move { dispatcher.run(rx).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.queue.unacknowledged() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(h.queue.unacknowledged(), 0);
    assert_eq!(h.queue.resets(), 2);
    assert!(h.store.row(EntityKind::Organization, "ORG-1").is_some());
}

#[tokio::test]
async fn test_shutdown_finishes_in_flight_batch() {
    let h = Harness::new();
    h.store.set_delay(Duration::from_millis(50));
    for i in 0..5 {
        h.queue.push(&fixtures::organization(&format!("ORG-{}", i)));
    }

    let (tx, rx) = watch::channel(false);
    let dispatcher = h.dispatcher.clone();
    let handle = tokio::spawn(async move { dispatcher.run(rx).await });

    // let the batch get picked up, then ask to stop mid-flight
    while h.store.upsert_calls() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(h.queue.unacknowledged(), 0);
    assert_eq!(h.store.count(EntityKind::Organization), 5);
}

#[tokio::test]
async fn test_sequential_mode_processes_everything() {
    let config = PipelineConfig {
        workers: 1,
        ..test_config()
    };
    let h = Harness::with_config(config, 3);
    for i in 0..10 {
        h.queue.push(&fixtures::organization(&format!("ORG-{}", i)));
    }

    let report = h.drain().await.unwrap();
    assert_eq!(report.received, 10);
    assert_eq!(report.created, 10);
    assert_eq!(h.queue.acks().len(), 4);
}

#[tokio::test]
async fn test_peek_does_not_consume() {
    let h = Harness::new();
    h.queue.push(&fixtures::organization("ORG-1"));
    h.queue.push(&fixtures::organization("ORG-2"));

    assert_eq!(h.queue.peek(10).await.unwrap().len(), 2);
    assert_eq!(h.queue.peek(1).await.unwrap().len(), 1);
    assert_eq!(h.queue.unacknowledged(), 2);

    h.drain().await.unwrap();
    assert!(h.queue.peek(10).await.unwrap().is_empty());
}
