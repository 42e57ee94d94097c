// Copyright 2025 Cowboy AI, LLC.

//! Event idempotency gate
//!
//! Each gate call is a separate write to the [`ProcessedEventStore`], so a
//! claim or an outcome is durable no matter what happens to the admission
//! that follows it. A claimed event is never processed again: redelivery of a
//! PROCESSING, COMPLETED or FAILED event is reported as a duplicate.

use crate::persistence::{EventStatus, ProcessedEvent, ProcessedEventStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of trying to claim an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// This consumer now owns the event
    Acquired,
    /// The event was already claimed; `status` is `None` when a concurrent
    /// claim won the race and its row was not read back
    Duplicate {
        /// Recorded status of the earlier claim
        status: Option<EventStatus>,
    },
}

impl GateDecision {
    /// Whether the caller should go on to process the event
    pub fn is_acquired(&self) -> bool {
        matches!(self, GateDecision::Acquired)
    }
}

/// Durable per-event processing claim
#[derive(Clone)]
pub struct EventIdempotencyGate {
    store: Arc<dyn ProcessedEventStore>,
}

impl EventIdempotencyGate {
    /// Create a gate over `store`
    pub fn new(store: Arc<dyn ProcessedEventStore>) -> Self {
        Self { store }
    }

    /// Claim `event_id` by inserting a PROCESSING row
    pub async fn try_acquire(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> Result<GateDecision, StoreError> {
        if let Some(existing) = self.store.find(event_id).await? {
            info!(
                event_id,
                status = %existing.status,
                "Event already processed, skipping"
            );
            return Ok(GateDecision::Duplicate {
                status: Some(existing.status),
            });
        }

        match self
            .store
            .insert(ProcessedEvent::processing(event_id, event_type))
            .await
        {
            Ok(()) => {
                debug!(event_id, event_type, "Acquired processing lock");
                Ok(GateDecision::Acquired)
            }
            Err(StoreError::UniqueViolation { .. }) => {
                info!(event_id, "Event claimed concurrently by another consumer");
                Ok(GateDecision::Duplicate { status: None })
            }
            Err(e) => Err(e),
        }
    }

    /// Record that `event_id` was admitted
    pub async fn mark_completed(&self, event_id: &str) -> Result<(), StoreError> {
        let Some(mut event) = self.store.find(event_id).await? else {
            warn!(event_id, "Cannot mark unknown event as completed");
            return Ok(());
        };
        event.complete(Utc::now());
        self.store.update(event).await?;
        debug!(event_id, "Marked event as completed");
        Ok(())
    }

    /// Record that `event_id` failed with `message`
    pub async fn mark_failed(&self, event_id: &str, message: &str) -> Result<(), StoreError> {
        let Some(mut event) = self.store.find(event_id).await? else {
            warn!(event_id, "Cannot mark unknown event as failed");
            return Ok(());
        };
        event.fail(Utc::now(), message);
        self.store.update(event).await?;
        debug!(event_id, error_message = message, "Marked event as failed");
        Ok(())
    }

    /// Current audit row of `event_id`
    pub async fn status(&self, event_id: &str) -> Result<Option<ProcessedEvent>, StoreError> {
        self.store.find(event_id).await
    }

    /// Delete audit rows created before `cutoff`
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = self.store.delete_created_before(cutoff).await?;
        info!(deleted, cutoff = %cutoff.to_rfc3339(), "Cleaned up processed events");
        Ok(deleted)
    }
}

/// Periodically purge audit rows older than `retention`
///
/// The first purge runs immediately. Failures are logged and the loop keeps
/// going; abort the returned handle to stop it. A zero `every` is raised to
/// one second.
pub fn spawn_housekeeping(
    gate: Arc<EventIdempotencyGate>,
    retention: chrono::Duration,
    every: std::time::Duration,
) -> JoinHandle<()> {
    let every = if every.is_zero() {
        warn!("Housekeeping interval is zero, using one second");
        std::time::Duration::from_secs(1)
    } else {
        every
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
                error!(
                    retention_days = retention.num_days(),
                    "Retention reaches before the earliest representable instant, skipping purge"
                );
                continue;
            };
            if let Err(e) = gate.purge_older_than(cutoff).await {
                error!(error = %e, "Processed event housekeeping failed");
            }
        }
    })
}
