// Copyright 2025 Cowboy AI, LLC.

//! Infrastructure layer
//!
//! NATS adapters for the broker seams:
//! - NATS client and JetStream context
//! - Durable pull consumer feeding the event processor
//! - Dead-letter sink publishing with diagnostic headers
//!
//! The JetStream key-value stores live in [`crate::persistence`].

pub mod jetstream_consumer;
pub mod jetstream_dead_letter;
pub mod nats_client;

pub use jetstream_consumer::{EventConsumerConfig, JetStreamAck, TransactionEventConsumer};
pub use jetstream_dead_letter::JetStreamDeadLetterSink;
pub use nats_client::{NatsClient, NatsConfig, NatsError};
