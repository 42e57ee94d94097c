// Copyright 2025 Cowboy AI, LLC.

//! Dead-letter publishing
//!
//! Events that must not be retried are republished unchanged to a secondary
//! destination together with headers describing where they came from and why
//! they failed. A failing dead-letter sink never fails the caller: the
//! original message is acknowledged either way.

use crate::broker::{BrokerError, DeliveryContext};
use crate::errors::IntakeError;
use crate::events::TransactionEvent;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, warn};

/// Header naming the topic the message was consumed from
pub const HEADER_ORIGINAL_TOPIC: &str = "originalTopic";
/// Header naming the partition the message was consumed from
pub const HEADER_ORIGINAL_PARTITION: &str = "originalPartition";
/// Header carrying the offset of the consumed message
pub const HEADER_ORIGINAL_OFFSET: &str = "originalOffset";
/// Header carrying the failure's type name
pub const HEADER_EXCEPTION_TYPE: &str = "exceptionType";
/// Header carrying the failure's message
pub const HEADER_EXCEPTION_MESSAGE: &str = "exceptionMessage";
/// Header carrying the time of the dead-letter publish
pub const HEADER_DLQ_TIMESTAMP: &str = "dlqTimestamp";

/// Exception type recorded for bodies that are not a valid envelope
pub const DESERIALIZATION_ERROR: &str = "DeserializationError";

/// Diagnostic metadata attached to a dead-lettered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterHeaders {
    /// Where the message was consumed from
    pub origin: DeliveryContext,
    /// Failure type name
    pub exception_type: String,
    /// Failure message
    pub exception_message: String,
    /// When the dead-letter publish was attempted
    pub dlq_timestamp: DateTime<Utc>,
}

impl DeadLetterHeaders {
    /// Headers as ordered name/value pairs
    pub fn to_pairs(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (HEADER_ORIGINAL_TOPIC, self.origin.topic.clone()),
            (HEADER_ORIGINAL_PARTITION, self.origin.partition.to_string()),
            (HEADER_ORIGINAL_OFFSET, self.origin.offset.to_string()),
            (HEADER_EXCEPTION_TYPE, self.exception_type.clone()),
            (HEADER_EXCEPTION_MESSAGE, self.exception_message.clone()),
            (
                HEADER_DLQ_TIMESTAMP,
                self.dlq_timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ])
    }
}

/// A message bound for the dead-letter destination
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterMessage {
    /// Partitioning key, the event id when known
    pub key: Option<String>,
    /// Original message body
    pub payload: Bytes,
    /// Diagnostic headers
    pub headers: DeadLetterHeaders,
}

/// Destination for dead-lettered messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Publish one message and wait for the destination to accept it
    async fn publish(&self, message: DeadLetterMessage) -> Result<(), BrokerError>;
}

/// Sink that keeps messages in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterSink {
    messages: Arc<RwLock<Vec<DeadLetterMessage>>>,
}

impl InMemoryDeadLetterSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published so far, oldest first
    pub async fn messages(&self) -> Vec<DeadLetterMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn publish(&self, message: DeadLetterMessage) -> Result<(), BrokerError> {
        self.messages.write().await.push(message);
        Ok(())
    }
}

/// Republishes unprocessable events with diagnostics
#[derive(Clone)]
pub struct DeadLetterPublisher {
    sink: Arc<dyn DeadLetterSink>,
}

impl DeadLetterPublisher {
    /// Create a publisher writing to `sink`
    pub fn new(sink: Arc<dyn DeadLetterSink>) -> Self {
        Self { sink }
    }

    /// Dead-letter a decoded event that failed with `failure`
    ///
    /// Returns whether the sink accepted the message.
    pub async fn publish_event(
        &self,
        event: &TransactionEvent,
        failure: &IntakeError,
        origin: &DeliveryContext,
    ) -> bool {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                error!(
                    event_id = ?event.event_id,
                    error = %e,
                    "Failed to encode event for dead-letter"
                );
                return false;
            }
        };
        self.publish_raw(
            event.id().map(str::to_string),
            payload,
            failure.kind(),
            &failure.to_string(),
            origin,
        )
        .await
    }

    /// Dead-letter an arbitrary message body
    pub async fn publish_raw(
        &self,
        key: Option<String>,
        payload: Bytes,
        exception_type: &str,
        exception_message: &str,
        origin: &DeliveryContext,
    ) -> bool {
        let message = DeadLetterMessage {
            key: key.clone(),
            payload,
            headers: DeadLetterHeaders {
                origin: origin.clone(),
                exception_type: exception_type.to_string(),
                exception_message: exception_message.to_string(),
                dlq_timestamp: Utc::now(),
            },
        };

        match self.sink.publish(message).await {
            Ok(()) => {
                warn!(
                    event_id = ?key,
                    origin = %origin,
                    exception_type,
                    "Sent event to dead-letter destination"
                );
                true
            }
            Err(e) => {
                error!(
                    event_id = ?key,
                    origin = %origin,
                    error = %e,
                    "Failed to send event to dead-letter destination"
                );
                false
            }
        }
    }
}
