// Copyright 2025 Cowboy AI, LLC.

//! Service assembly
//!
//! Wires the stores, the admission pipeline and the broker adapters together
//! from an [`IntakeConfig`].

use crate::admission::TransactionAdmissionService;
use crate::config::IntakeConfig;
use crate::dead_letter::{DeadLetterPublisher, DeadLetterSink, InMemoryDeadLetterSink};
use crate::event_processor::EventProcessor;
use crate::idempotency::{spawn_housekeeping, EventIdempotencyGate};
use crate::infrastructure::{JetStreamDeadLetterSink, NatsClient, TransactionEventConsumer};
use crate::persistence::{
    InMemoryProcessedEventStore, InMemoryTransactionStore, JetStreamProcessedEventStore,
    JetStreamTransactionStore, ProcessedEventStore, TransactionStore,
};
use crate::queries::TransactionQueryService;
use std::sync::Arc;
use tracing::info;

/// The assembled intake pipeline
#[derive(Clone)]
pub struct IntakeService {
    admission: TransactionAdmissionService,
    queries: TransactionQueryService,
    gate: Arc<EventIdempotencyGate>,
    processor: EventProcessor,
}

impl IntakeService {
    /// Assemble the pipeline over the given stores and dead-letter sink
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        processed_events: Arc<dyn ProcessedEventStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let admission = TransactionAdmissionService::new(transactions.clone());
        let gate = EventIdempotencyGate::new(processed_events);
        let processor = EventProcessor::new(
            gate.clone(),
            admission.clone(),
            DeadLetterPublisher::new(dead_letters),
        );
        Self {
            queries: TransactionQueryService::new(transactions),
            gate: Arc::new(gate),
            admission,
            processor,
        }
    }

    /// Assemble the pipeline over in-memory stores
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryTransactionStore::new()),
            Arc::new(InMemoryProcessedEventStore::new()),
            Arc::new(InMemoryDeadLetterSink::new()),
        )
    }

    /// Synchronous submission entry point
    pub fn admission(&self) -> &TransactionAdmissionService {
        &self.admission
    }

    /// Read side
    pub fn queries(&self) -> &TransactionQueryService {
        &self.queries
    }

    /// Event path entry point
    pub fn processor(&self) -> &EventProcessor {
        &self.processor
    }

    /// The idempotency gate shared with housekeeping
    pub fn gate(&self) -> Arc<EventIdempotencyGate> {
        self.gate.clone()
    }
}

/// Connect to NATS and consume transaction events until the stream ends
pub async fn run(config: IntakeConfig) -> anyhow::Result<()> {
    config.validate()?;
    let nats = NatsClient::connect(config.nats.clone()).await?;

    let transactions =
        JetStreamTransactionStore::new(nats.client().clone(), config.transactions_kv()).await?;
    let processed_events =
        JetStreamProcessedEventStore::new(nats.client().clone(), config.processed_events_kv())
            .await?;
    let sink = JetStreamDeadLetterSink::new(
        nats.jetstream().clone(),
        config.dead_letter_subject.clone(),
    );
    sink.ensure_stream(&config.dead_letter_stream).await?;

    let service = IntakeService::new(
        Arc::new(transactions),
        Arc::new(processed_events),
        Arc::new(sink),
    );
    let housekeeping = spawn_housekeeping(
        service.gate(),
        config.retention(),
        config.housekeeping_interval(),
    );

    let consumer = TransactionEventConsumer::bind(
        nats.jetstream(),
        &config.consumer(),
        service.processor.clone(),
    )
    .await?;
    info!(subject = %config.transactions_subject, "Transaction intake running");

    let result = consumer.run().await;
    housekeeping.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionCommand;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_in_memory_service_round_trip() {
        let service = IntakeService::in_memory();
        let admission = service
            .admission()
            .submit(TransactionCommand {
                store_id: Some("S1".into()),
                till_id: Some("T1".into()),
                payment_method: Some("cash".into()),
                total_amount: Some(Decimal::new(100, 2)),
                timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()),
                ..Default::default()
            })
            .await
            .unwrap();

        let found = service.queries().by_till("T1").await.unwrap();
        assert_eq!(found, vec![admission.into_record()]);
    }
}
