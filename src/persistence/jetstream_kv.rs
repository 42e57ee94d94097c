// Copyright 2025 Cowboy AI, LLC.

//! JetStream key-value backed stores
//!
//! A bucket's atomic `create` (write only if the key has no live value) plays
//! the role of a unique constraint. Transactions are stored under their
//! natural key; a second key per business id enforces id uniqueness. The
//! revision of the natural-key entry is the record's surrogate id.

use super::{
    newest_first, ConflictKind, InsertOutcome, ProcessedEvent, ProcessedEventStore, RecordFilter,
    StoreError, TransactionStore,
};
use crate::transaction::{NaturalKey, NewTransaction, TransactionId, TransactionRecord};
use async_nats::jetstream::{self, kv};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const NATURAL_KEY_PREFIX: &str = "nk";
const BUSINESS_ID_PREFIX: &str = "id";
const EVENT_PREFIX: &str = "ev";

/// Configuration for a key-value bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvStoreConfig {
    /// Bucket name
    pub bucket: String,
    /// Revisions kept per key
    pub history: i64,
    /// Bucket description
    pub description: String,
}

impl KvStoreConfig {
    /// Configuration for a transaction bucket
    pub fn transactions(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            history: 1,
            description: "Admitted till transactions".to_string(),
        }
    }

    /// Configuration for a processed-event bucket
    pub fn processed_events(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            history: 5,
            description: "Idempotency audit of consumed transaction events".to_string(),
        }
    }
}

async fn open_bucket(client: Client, config: &KvStoreConfig) -> Result<kv::Store, StoreError> {
    let jetstream = jetstream::new(client);
    jetstream
        .create_key_value(kv::Config {
            bucket: config.bucket.clone(),
            description: config.description.clone(),
            history: config.history,
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        })
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to open bucket {}: {e}", config.bucket))
        })
}

/// Encode arbitrary text into characters valid in a KV key
fn encode_token(raw: &str) -> String {
    raw.bytes().map(|b| format!("{b:02x}")).collect()
}

fn natural_key_entry(key: &NaturalKey) -> String {
    format!(
        "{NATURAL_KEY_PREFIX}.{}.{}.{}_{:09}",
        encode_token(&key.store_id),
        encode_token(&key.till_id),
        key.timestamp.timestamp(),
        key.timestamp.timestamp_subsec_nanos()
    )
}

fn business_id_entry(transaction_id: &TransactionId) -> String {
    format!("{BUSINESS_ID_PREFIX}.{}", transaction_id.as_str())
}

fn event_entry(event_id: &str) -> String {
    format!("{EVENT_PREFIX}.{}", encode_token(event_id))
}

/// Transaction store on a JetStream key-value bucket
#[derive(Clone)]
pub struct JetStreamTransactionStore {
    kv: kv::Store,
}

impl JetStreamTransactionStore {
    /// Open (or create) the bucket
    pub async fn new(client: Client, config: KvStoreConfig) -> Result<Self, StoreError> {
        let kv = open_bucket(client, &config).await?;
        Ok(Self { kv })
    }

    async fn load(&self, entry: &str) -> Result<Option<TransactionRecord>, StoreError> {
        let found = self
            .kv
            .entry(entry)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to load {entry}: {e}")))?;
        match found {
            Some(found) if matches!(found.operation, kv::Operation::Put) => {
                let mut record: TransactionRecord = serde_json::from_slice(&found.value)?;
                record.id = found.revision;
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl TransactionStore for JetStreamTransactionStore {
    async fn insert(&self, transaction: NewTransaction) -> Result<InsertOutcome, StoreError> {
        let nk_entry = natural_key_entry(&transaction.natural_key());
        let id_entry = business_id_entry(&transaction.transaction_id);

        let mut record = transaction.into_record(0, Utc::now());
        let payload = Bytes::from(serde_json::to_vec(&record)?);

        // The natural key goes first so a colliding retry always finds the record
        record.id = match self.kv.create(&nk_entry, payload).await {
            Ok(revision) => revision,
            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => {
                return Ok(InsertOutcome::Conflict(ConflictKind::NaturalKey));
            }
            Err(e) => return Err(StoreError::Backend(format!("Failed to write {nk_entry}: {e}"))),
        };

        match self
            .kv
            .create(&id_entry, Bytes::from(nk_entry.clone()))
            .await
        {
            Ok(_) => Ok(InsertOutcome::Admitted(record)),
            Err(e) => {
                // Withdraw the record so nothing half-written stays visible
                if let Err(release) = self.kv.purge(&nk_entry).await {
                    warn!(
                        entry = %nk_entry,
                        error = %release,
                        "Failed to withdraw transaction record"
                    );
                }
                if e.kind() == kv::CreateErrorKind::AlreadyExists {
                    Ok(InsertOutcome::Conflict(ConflictKind::BusinessId))
                } else {
                    Err(StoreError::Backend(format!("Failed to claim {id_entry}: {e}")))
                }
            }
        }
    }

    async fn find_by_natural_key(
        &self,
        key: &NaturalKey,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        self.load(&natural_key_entry(key)).await
    }

    async fn find_by_business_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let id_entry = business_id_entry(transaction_id);
        let nk_entry = match self.kv.get(&id_entry).await {
            Ok(Some(bytes)) => String::from_utf8(bytes.to_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StoreError::Backend(format!("Failed to load {id_entry}: {e}"))),
        };
        self.load(&nk_entry).await
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut keys = self
            .kv
            .keys()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to list keys: {e}")))?;

        let mut records = Vec::new();
        while let Some(key) = keys.next().await {
            let key = key.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !key.starts_with(NATURAL_KEY_PREFIX) {
                continue;
            }
            if let Some(record) = self.load(&key).await? {
                if filter.matches(&record) {
                    records.push(record);
                }
            }
        }
        newest_first(&mut records);
        Ok(records)
    }
}

/// Processed-event audit table on a JetStream key-value bucket
#[derive(Clone)]
pub struct JetStreamProcessedEventStore {
    kv: kv::Store,
}

impl JetStreamProcessedEventStore {
    /// Open (or create) the bucket
    pub async fn new(client: Client, config: KvStoreConfig) -> Result<Self, StoreError> {
        let kv = open_bucket(client, &config).await?;
        Ok(Self { kv })
    }

    async fn load(&self, entry: &str) -> Result<Option<ProcessedEvent>, StoreError> {
        match self.kv.get(entry).await {
            Ok(Some(bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Backend(format!("Failed to load {entry}: {e}"))),
        }
    }
}

#[async_trait]
impl ProcessedEventStore for JetStreamProcessedEventStore {
    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, StoreError> {
        self.load(&event_entry(event_id)).await
    }

    async fn insert(&self, event: ProcessedEvent) -> Result<(), StoreError> {
        let entry = event_entry(&event.event_id);
        let payload = Bytes::from(serde_json::to_vec(&event)?);
        match self.kv.create(&entry, payload).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => {
                Err(StoreError::UniqueViolation {
                    constraint: format!("{}.event_id", EVENT_PREFIX),
                })
            }
            Err(e) => Err(StoreError::Backend(format!("Failed to insert {entry}: {e}"))),
        }
    }

    async fn update(&self, event: ProcessedEvent) -> Result<(), StoreError> {
        let entry = event_entry(&event.event_id);
        let payload = Bytes::from(serde_json::to_vec(&event)?);
        self.kv
            .put(&entry, payload)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to update {entry}: {e}")))?;
        Ok(())
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut keys = self
            .kv
            .keys()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to list keys: {e}")))?;

        let mut expired = Vec::new();
        while let Some(key) = keys.next().await {
            let key = key.map_err(|e| StoreError::Backend(e.to_string()))?;
            match self.load(&key).await {
                Ok(Some(event)) if event.created_at < cutoff => expired.push(key),
                Ok(_) => {}
                Err(e) => warn!(entry = %key, error = %e, "Skipping unreadable processed event"),
            }
        }

        for key in &expired {
            self.kv
                .purge(key)
                .await
                .map_err(|e| StoreError::Backend(format!("Failed to purge {key}: {e}")))?;
        }
        debug!(count = expired.len(), cutoff = %cutoff, "Purged processed events");
        Ok(expired.len())
    }
}
