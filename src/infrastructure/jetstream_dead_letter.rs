// Copyright 2025 Cowboy AI, LLC.

//! Dead-letter sink publishing to a JetStream subject

use crate::broker::BrokerError;
use crate::dead_letter::{DeadLetterMessage, DeadLetterSink};
use async_nats::jetstream::{stream, Context as JetStreamContext};
use async_nats::HeaderMap;
use async_trait::async_trait;
use tracing::info;

/// Header carrying the message key, when there is one
pub const HEADER_MESSAGE_KEY: &str = "messageKey";

/// Publishes dead-lettered messages with their diagnostics as NATS headers
#[derive(Clone)]
pub struct JetStreamDeadLetterSink {
    jetstream: JetStreamContext,
    subject: String,
}

impl JetStreamDeadLetterSink {
    /// Create a sink publishing to `subject`
    pub fn new(jetstream: JetStreamContext, subject: impl Into<String>) -> Self {
        Self {
            jetstream,
            subject: subject.into(),
        }
    }

    /// Destination subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Make sure a stream named `stream_name` captures the destination subject
    pub async fn ensure_stream(&self, stream_name: &str) -> Result<(), BrokerError> {
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: stream_name.to_string(),
                subjects: vec![self.subject.clone()],
                storage: stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                BrokerError::Publish(format!("Failed to open stream {stream_name}: {e}"))
            })?;
        info!(stream = stream_name, subject = %self.subject, "Dead-letter stream ready");
        Ok(())
    }
}

fn header_map(message: &DeadLetterMessage) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in message.headers.to_pairs() {
        headers.insert(name, value.as_str());
    }
    if let Some(key) = &message.key {
        headers.insert(HEADER_MESSAGE_KEY, key.as_str());
    }
    headers
}

#[async_trait]
impl DeadLetterSink for JetStreamDeadLetterSink {
    async fn publish(&self, message: DeadLetterMessage) -> Result<(), BrokerError> {
        let headers = header_map(&message);
        // The first await sends, the second waits for the stream to store it
        self.jetstream
            .publish_with_headers(self.subject.clone(), headers, message.payload)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }
}
