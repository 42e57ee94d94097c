// Copyright 2025 Cowboy AI, LLC.

//! Audit records behind the event idempotency gate

use super::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing status of a broker event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Claimed by a consumer, outcome not yet recorded
    Processing,
    /// Admitted successfully
    Completed,
    /// Terminally failed
    Failed,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventStatus::Processing => "PROCESSING",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One row of the idempotency audit table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    /// Broker event id (primary key)
    pub event_id: String,
    /// Envelope event type
    pub event_type: String,
    /// Current status
    pub status: EventStatus,
    /// When the claim was taken
    pub created_at: DateTime<Utc>,
    /// When the event completed
    pub processed_at: Option<DateTime<Utc>>,
    /// When the event failed
    pub failed_at: Option<DateTime<Utc>>,
    /// Why the event failed
    pub error_message: Option<String>,
}

impl ProcessedEvent {
    /// A fresh claim in [`EventStatus::Processing`]
    pub fn processing(event_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            status: EventStatus::Processing,
            created_at: Utc::now(),
            processed_at: None,
            failed_at: None,
            error_message: None,
        }
    }

    /// Transition to [`EventStatus::Completed`]
    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = EventStatus::Completed;
        self.processed_at = Some(at);
    }

    /// Transition to [`EventStatus::Failed`]
    pub fn fail(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        self.status = EventStatus::Failed;
        self.failed_at = Some(at);
        self.error_message = Some(message.into());
    }
}

/// Storage for [`ProcessedEvent`] rows
///
/// Every call is its own unit of work, committed independently of whatever
/// business operation the caller is in the middle of.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Fetch a row by event id
    async fn find(&self, event_id: &str) -> Result<Option<ProcessedEvent>, StoreError>;

    /// Insert a new row; fails with [`StoreError::UniqueViolation`] if the id exists
    async fn insert(&self, event: ProcessedEvent) -> Result<(), StoreError>;

    /// Overwrite an existing row
    async fn update(&self, event: ProcessedEvent) -> Result<(), StoreError>;

    /// Delete rows created before `cutoff`, returning how many went
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}
