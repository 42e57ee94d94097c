// Copyright 2025 Cowboy AI, LLC.

//! In-memory stores
//!
//! Each operation runs under a single lock, which gives the same all-or-nothing
//! insert and unique-constraint behaviour a relational backend would.

use super::{
    newest_first, ConflictKind, InsertOutcome, ProcessedEvent, ProcessedEventStore, RecordFilter,
    StoreError, TransactionStore,
};
use crate::transaction::{NaturalKey, NewTransaction, TransactionId, TransactionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct TransactionTables {
    next_id: u64,
    records: HashMap<u64, TransactionRecord>,
    by_natural_key: HashMap<NaturalKey, u64>,
    by_business_id: HashMap<TransactionId, u64>,
}

/// Transaction store held in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionStore {
    tables: Arc<RwLock<TransactionTables>>,
}

impl InMemoryTransactionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transactions
    pub async fn len(&self) -> usize {
        self.tables.read().await.records.len()
    }

    /// Whether the store holds no transactions
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, transaction: NewTransaction) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.tables.write().await;

        let key = transaction.natural_key();
        if tables.by_natural_key.contains_key(&key) {
            return Ok(InsertOutcome::Conflict(ConflictKind::NaturalKey));
        }
        if tables.by_business_id.contains_key(&transaction.transaction_id) {
            return Ok(InsertOutcome::Conflict(ConflictKind::BusinessId));
        }

        tables.next_id += 1;
        let id = tables.next_id;
        let record = transaction.into_record(id, Utc::now());

        tables.by_natural_key.insert(key, id);
        tables
            .by_business_id
            .insert(record.transaction_id.clone(), id);
        tables.records.insert(id, record.clone());

        Ok(InsertOutcome::Admitted(record))
    }

    async fn find_by_natural_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_natural_key
            .get(key)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    async fn find_by_business_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_business_id
            .get(transaction_id)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<TransactionRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }
}

/// Processed-event audit table held in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessedEventStore {
    events: Arc<RwLock<HashMap<String, ProcessedEvent>>>,
}

impl InMemoryProcessedEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the table is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, StoreError> {
        Ok(self.events.read().await.get(event_id).cloned())
    }

    async fn insert(&self, event: ProcessedEvent) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.event_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "processed_events.event_id".to_string(),
            });
        }
        events.insert(event.event_id.clone(), event);
        Ok(())
    }

    async fn update(&self, event: ProcessedEvent) -> Result<(), StoreError> {
        self.events
            .write()
            .await
            .insert(event.event_id.clone(), event);
        Ok(())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|_, event| event.created_at >= cutoff);
        Ok(before - events.len())
    }
}
