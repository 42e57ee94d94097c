// Copyright 2025 Cowboy AI, LLC.

//! Broker-facing seams
//!
//! The pipeline only needs to know where a message came from and how to
//! acknowledge it. Concrete JetStream implementations live in
//! [`crate::infrastructure`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by broker adapters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    /// Publishing a message failed
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Acknowledging a message failed
    #[error("Acknowledge failed: {0}")]
    Acknowledge(String),

    /// A message body could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),
}

/// Where a delivered message came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    /// Topic (subject) the message was consumed from
    pub topic: String,
    /// Partition of the topic; always 0 on brokers without partitions
    pub partition: i32,
    /// Position of the message in its partition
    pub offset: u64,
}

impl DeliveryContext {
    /// Create a delivery context
    pub fn new(topic: impl Into<String>, partition: i32, offset: u64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

impl fmt::Display for DeliveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// Manual acknowledgment of one delivered message
///
/// A message that is never acknowledged is redelivered by the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Acknowledgment: Send + Sync {
    /// Remove the message from the queue
    async fn acknowledge(&self) -> Result<(), BrokerError>;
}
