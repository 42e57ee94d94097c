// Copyright 2025 Cowboy AI, LLC.

//! # Persistence Layer
//!
//! Storage seams for the admission pipeline. All mutual exclusion is delegated
//! to the store's atomic unique constraints; nothing in this crate holds an
//! in-process lock for correctness.
//!
//! ## Components
//!
//! - **Transaction store**: insert with a natural-key and a business-id unique
//!   constraint, reporting a collision as [`InsertOutcome::Conflict`]
//! - **Processed event store**: the audit table behind the idempotency gate
//! - **Backends**: in-memory (tests, embedders) and JetStream key-value buckets

pub mod in_memory;
pub mod jetstream_kv;
pub mod processed_events;

use crate::transaction::{NaturalKey, NewTransaction, TransactionId, TransactionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use in_memory::{InMemoryProcessedEventStore, InMemoryTransactionStore};
pub use jetstream_kv::{JetStreamProcessedEventStore, JetStreamTransactionStore, KvStoreConfig};
pub use processed_events::{EventStatus, ProcessedEvent, ProcessedEventStore};
#[cfg(test)]
pub use processed_events::MockProcessedEventStore;

/// Errors raised by a backing store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint
        constraint: String,
    },

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Which unique constraint an insert collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Another record has the same (store, till, timestamp)
    NaturalKey,
    /// Another record has the same business id
    BusinessId,
}

/// Result of attempting to insert a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The record was written
    Admitted(TransactionRecord),
    /// A unique constraint rejected the record; nothing was written
    Conflict(ConflictKind),
}

/// Selection for listing transactions
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFilter {
    /// All transactions of one store
    Store(String),
    /// All transactions rung on one till
    Till(String),
    /// All transactions of one loyalty customer
    Customer(String),
    /// Transactions with a timestamp in `[start, end]`
    DateRange {
        /// Inclusive lower bound
        start: DateTime<Utc>,
        /// Inclusive upper bound
        end: DateTime<Utc>,
    },
}

impl RecordFilter {
    /// Whether a record is selected by this filter
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        match self {
            RecordFilter::Store(store_id) => &record.store_id == store_id,
            RecordFilter::Till(till_id) => &record.till_id == till_id,
            RecordFilter::Customer(customer_id) => {
                record.customer_id.as_deref() == Some(customer_id.as_str())
            }
            RecordFilter::DateRange { start, end } => {
                record.timestamp >= *start && record.timestamp <= *end
            }
        }
    }
}

/// Durable home of [`TransactionRecord`]s
///
/// `insert` must write the transaction and all of its items atomically, and
/// must enforce uniqueness of both the natural key and the business id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new transaction
    async fn insert(&self, transaction: NewTransaction) -> Result<InsertOutcome, StoreError>;

    /// Look a transaction up by its natural key
    async fn find_by_natural_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    /// Look a transaction up by its business id
    async fn find_by_business_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    /// List matching transactions, newest first
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// Sort records newest first, breaking ties by surrogate id
pub(crate) fn newest_first(records: &mut [TransactionRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}
