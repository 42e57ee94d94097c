// Copyright 2025 Cowboy AI, LLC.

//! JetStream consumer feeding transaction events to the [`EventProcessor`]
//!
//! Messages are handled one at a time: the next message is not pulled until
//! the current one has been acknowledged or deliberately left for redelivery.

use crate::broker::{Acknowledgment, BrokerError, DeliveryContext};
use crate::dead_letter::DESERIALIZATION_ERROR;
use crate::event_processor::{EventProcessor, ProcessingOutcome};
use crate::events::TransactionEvent;
use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::{self, stream, Context as JetStreamContext};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Where and how to consume transaction events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConsumerConfig {
    /// Stream holding the events
    pub stream_name: String,
    /// Subject the events are published on
    pub subject: String,
    /// Durable consumer name shared by all intake workers
    pub durable_name: String,
}

/// Explicit acknowledgment of a JetStream message
pub struct JetStreamAck {
    message: jetstream::Message,
}

impl JetStreamAck {
    /// Wrap a delivered message
    pub fn new(message: jetstream::Message) -> Self {
        Self { message }
    }
}

#[async_trait]
impl Acknowledgment for JetStreamAck {
    async fn acknowledge(&self) -> Result<(), BrokerError> {
        self.message
            .ack()
            .await
            .map_err(|e| BrokerError::Acknowledge(e.to_string()))
    }
}

/// Durable pull consumer for the transaction event stream
pub struct TransactionEventConsumer {
    consumer: PullConsumer,
    processor: EventProcessor,
}

impl TransactionEventConsumer {
    /// Bind to (creating if needed) the stream and the durable consumer
    pub async fn bind(
        jetstream: &JetStreamContext,
        config: &EventConsumerConfig,
        processor: EventProcessor,
    ) -> anyhow::Result<Self> {
        let stream = jetstream
            .get_or_create_stream(stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![config.subject.clone()],
                storage: stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open stream {}: {e}", config.stream_name))?;

        let consumer = stream
            .get_or_create_consumer(
                &config.durable_name,
                pull::Config {
                    durable_name: Some(config.durable_name.clone()),
                    filter_subject: config.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    deliver_policy: DeliverPolicy::All,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                anyhow::anyhow!("Failed to create consumer {}: {e}", config.durable_name)
            })?;

        info!(
            stream = %config.stream_name,
            subject = %config.subject,
            consumer = %config.durable_name,
            "Bound transaction event consumer"
        );
        Ok(Self {
            consumer,
            processor,
        })
    }

    /// Consume until the message stream ends
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut messages = self
            .consumer
            .messages()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to pull messages: {e}"))?;

        while let Some(message) = messages.next().await {
            match message {
                Ok(message) => self.handle(message).await,
                Err(e) => warn!(error = %e, "Failed to receive message"),
            }
        }
        Ok(())
    }

    /// Process one delivered message
    pub async fn handle(&self, message: jetstream::Message) {
        let origin = delivery_context(&message);
        let payload = message.payload.clone();
        let ack = JetStreamAck::new(message);

        let event = match decode(&payload) {
            Ok(event) => event,
            Err(e) => {
                error!(origin = %origin, error = %e, "Failed to deserialize transaction event");
                self.processor
                    .dead_letters()
                    .publish_raw(None, payload, DESERIALIZATION_ERROR, &e.to_string(), &origin)
                    .await;
                if let Err(e) = ack.acknowledge().await {
                    warn!(origin = %origin, error = %e, "Failed to acknowledge message");
                }
                return;
            }
        };

        match self.processor.process(event.as_ref(), &origin, &ack).await {
            Ok(ProcessingOutcome::Completed(record)) => debug!(
                origin = %origin,
                transaction_id = %record.transaction_id,
                "Message completed"
            ),
            Ok(outcome) => debug!(origin = %origin, ?outcome, "Message settled"),
            Err(e) => warn!(origin = %origin, error = %e, "Message left for redelivery"),
        }
    }
}

fn delivery_context(message: &jetstream::Message) -> DeliveryContext {
    let offset = match message.info() {
        Ok(info) => info.stream_sequence,
        Err(e) => {
            warn!(error = %e, "Message carries no delivery info");
            0
        }
    };
    DeliveryContext::new(message.subject.as_str(), 0, offset)
}

/// Decode a message body; a JSON `null` is a null envelope
fn decode(payload: &[u8]) -> Result<Option<TransactionEvent>, BrokerError> {
    serde_json::from_slice(payload).map_err(|e| BrokerError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_envelope() {
        let event = decode(br#"{"eventId":"E1","eventType":"TRANSACTION_CREATED","data":{}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.id(), Some("E1"));
    }

    #[test]
    fn test_decode_null_body() {
        assert_eq!(decode(b"null").unwrap(), None);
    }

    #[test]
    fn test_decode_garbage_is_an_error() {
        assert!(matches!(decode(b"not json"), Err(BrokerError::Decode(_))));
        assert!(matches!(decode(br#"{"data": 5}"#), Err(BrokerError::Decode(_))));
    }
}
