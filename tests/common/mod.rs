// Copyright 2025 Cowboy AI, LLC.

//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cim_domain_transaction::{
    Acknowledgment, BrokerError, DeadLetterPublisher, DeliveryContext, EventIdempotencyGate,
    EventProcessor, InMemoryDeadLetterSink, InMemoryProcessedEventStore,
    InMemoryTransactionStore, LineItem, TransactionAdmissionService, TransactionCommand,
    TransactionEvent, TransactionStore,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Acknowledgment that counts how often it was called
#[derive(Debug, Default)]
pub struct RecordingAck {
    count: AtomicUsize,
}

impl RecordingAck {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Acknowledgment for RecordingAck {
    async fn acknowledge(&self) -> Result<(), BrokerError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

pub fn sale_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
}

fn line(name: &str, price: &str) -> LineItem {
    LineItem {
        product_name: Some(name.into()),
        unit_price: Some(dec(price)),
        quantity: Some(1),
        ..Default::default()
    }
}

/// Three items adding up to 7.69, paid by card
pub fn basket_command() -> TransactionCommand {
    TransactionCommand {
        customer_id: Some("C1".into()),
        store_id: Some("S1".into()),
        till_id: Some("T1".into()),
        payment_method: Some("card".into()),
        total_amount: Some(dec("7.69")),
        timestamp: Some(sale_time()),
        items: vec![
            line("Milk", "2.50"),
            line("Bread", "1.20"),
            line("Coffee", "3.99"),
        ],
        ..Default::default()
    }
}

/// Event payload for the same basket as [`basket_command`]
pub fn basket_payload() -> Value {
    json!({
        "customerId": "C1",
        "storeId": "S1",
        "tillId": "T1",
        "paymentMethod": "card",
        "totalAmount": 7.69,
        "timestamp": "2024-01-01T10:00:00Z",
        "items": [
            {"productName": "Milk", "unitPrice": 2.50, "quantity": 1},
            {"productName": "Bread", "unitPrice": "1.20", "quantity": 1},
            {"productName": "Coffee", "unitPrice": 3.99, "quantity": 1}
        ]
    })
}

pub fn event(event_id: &str, data: Value) -> TransactionEvent {
    serde_json::from_value(json!({
        "eventId": event_id,
        "eventType": "TRANSACTION_CREATED",
        "eventTimestamp": "2024-01-01T10:00:01Z",
        "source": "till",
        "version": "1.0",
        "data": data
    }))
    .unwrap()
}

pub fn origin(offset: u64) -> DeliveryContext {
    DeliveryContext::new("transactions.events", 0, offset)
}

/// An event processor wired to in-memory collaborators
pub struct Pipeline {
    pub transactions: Arc<InMemoryTransactionStore>,
    pub processed_events: Arc<InMemoryProcessedEventStore>,
    pub dead_letters: Arc<InMemoryDeadLetterSink>,
    pub processor: EventProcessor,
}

impl Pipeline {
    pub fn new() -> Self {
        let transactions = Arc::new(InMemoryTransactionStore::new());
        Self::with_store(transactions.clone(), transactions)
    }

    pub fn with_store(
        transactions: Arc<InMemoryTransactionStore>,
        admission_store: Arc<dyn TransactionStore>,
    ) -> Self {
        let processed_events = Arc::new(InMemoryProcessedEventStore::new());
        let dead_letters = Arc::new(InMemoryDeadLetterSink::new());
        let processor = EventProcessor::new(
            EventIdempotencyGate::new(processed_events.clone()),
            TransactionAdmissionService::new(admission_store),
            DeadLetterPublisher::new(dead_letters.clone()),
        );
        Self {
            transactions,
            processed_events,
            dead_letters,
            processor,
        }
    }
}
