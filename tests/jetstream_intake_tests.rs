// Copyright 2025 Cowboy AI, LLC.

//! Integration tests against JetStream
//!
//! These tests require a running NATS server with JetStream enabled.
//! Run with: `nats-server -js`

mod common;

use cim_domain_transaction::infrastructure::{
    JetStreamDeadLetterSink, NatsClient, NatsConfig, TransactionEventConsumer,
};
use cim_domain_transaction::persistence::{
    JetStreamProcessedEventStore, JetStreamTransactionStore, KvStoreConfig,
};
use cim_domain_transaction::{
    ConflictKind, DeadLetterPublisher, EventIdempotencyGate, EventProcessor, EventStatus,
    InsertOutcome, IntakeConfig, NewTransaction, ProcessedEvent, ProcessedEventStore,
    StoreError, TransactionAdmissionService, TransactionId, TransactionStore,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn connect() -> Option<NatsClient> {
    match NatsClient::connect(NatsConfig::default()).await {
        Ok(client) => Some(client),
        Err(_) => {
            eprintln!("Skipping test: NATS server not available");
            None
        }
    }
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_kv_transaction_store_enforces_both_constraints() {
    let Some(nats) = connect().await else { return };
    let store = JetStreamTransactionStore::new(
        nats.client().clone(),
        KvStoreConfig::transactions(unique("test-transactions")),
    )
    .await
    .unwrap();

    let command = common::basket_command();
    let first = NewTransaction::from_command(&command, TransactionId::generate()).unwrap();
    let InsertOutcome::Admitted(record) = store.insert(first.clone()).await.unwrap() else {
        panic!("expected admission");
    };

    let same_key = NewTransaction::from_command(&command, TransactionId::generate()).unwrap();
    assert_eq!(
        store.insert(same_key).await.unwrap(),
        InsertOutcome::Conflict(ConflictKind::NaturalKey)
    );

    let mut same_id = first;
    same_id.till_id = "T2".into();
    assert_eq!(
        store.insert(same_id).await.unwrap(),
        InsertOutcome::Conflict(ConflictKind::BusinessId)
    );

    let found = store
        .find_by_business_id(&record.transaction_id)
        .await
        .unwrap();
    assert_eq!(found, Some(record));
}

#[tokio::test]
async fn test_kv_processed_event_insert_is_unique() {
    let Some(nats) = connect().await else { return };
    let store = JetStreamProcessedEventStore::new(
        nats.client().clone(),
        KvStoreConfig::processed_events(unique("test-processed")),
    )
    .await
    .unwrap();

    store
        .insert(ProcessedEvent::processing("E1", "TRANSACTION_CREATED"))
        .await
        .unwrap();
    let err = store
        .insert(ProcessedEvent::processing("E1", "TRANSACTION_CREATED"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }));
}

#[tokio::test]
async fn test_consumer_admits_and_dead_letters() {
    let Some(nats) = connect().await else { return };
    let suffix = Uuid::new_v4().simple().to_string();
    let config = IntakeConfig {
        transactions_stream: format!("TEST-TRANSACTIONS-{suffix}"),
        transactions_subject: format!("test.{suffix}.transactions"),
        consumer_name: format!("intake-{suffix}"),
        dead_letter_subject: format!("test.{suffix}.dlq"),
        dead_letter_stream: format!("TEST-DLQ-{suffix}"),
        transactions_bucket: format!("test-transactions-{suffix}"),
        processed_events_bucket: format!("test-processed-{suffix}"),
        ..Default::default()
    };

    let transactions = Arc::new(
        JetStreamTransactionStore::new(nats.client().clone(), config.transactions_kv())
            .await
            .unwrap(),
    );
    let processed = Arc::new(
        JetStreamProcessedEventStore::new(nats.client().clone(), config.processed_events_kv())
            .await
            .unwrap(),
    );
    let sink = JetStreamDeadLetterSink::new(
        nats.jetstream().clone(),
        config.dead_letter_subject.clone(),
    );
    sink.ensure_stream(&config.dead_letter_stream).await.unwrap();
    let processor = EventProcessor::new(
        EventIdempotencyGate::new(processed.clone()),
        TransactionAdmissionService::new(transactions),
        DeadLetterPublisher::new(Arc::new(sink)),
    );

    let mut dead_letters = nats
        .client()
        .subscribe(config.dead_letter_subject.clone())
        .await
        .unwrap();
    let consumer = TransactionEventConsumer::bind(nats.jetstream(), &config.consumer(), processor)
        .await
        .unwrap();
    let worker = tokio::spawn(async move { consumer.run().await });

    let good = serde_json::to_vec(&common::event("E1", common::basket_payload())).unwrap();
    nats.jetstream()
        .publish(config.transactions_subject.clone(), good.into())
        .await
        .unwrap()
        .await
        .unwrap();
    nats.jetstream()
        .publish(config.transactions_subject.clone(), "not json".into())
        .await
        .unwrap()
        .await
        .unwrap();

    let dead = tokio::time::timeout(Duration::from_secs(5), dead_letters.next())
        .await
        .unwrap()
        .unwrap();
    let headers = dead.headers.unwrap();
    assert_eq!(
        headers.get("exceptionType").map(|v| v.as_str()),
        Some("DeserializationError")
    );

    let gate = EventIdempotencyGate::new(processed);
    let mut status = None;
    for _ in 0..50 {
        status = gate.status("E1").await.unwrap().map(|row| row.status);
        if status == Some(EventStatus::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(status, Some(EventStatus::Completed));
    worker.abort();
}
