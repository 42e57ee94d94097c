// Copyright 2025 Cowboy AI, LLC.

//! # CIM Domain Transaction
//!
//! Exactly-once admission of retail till transactions arriving over two
//! ingress paths: synchronous submission and an at-least-once event feed.
//!
//! ## Pipeline
//!
//! - **Synchronous**: [`CommandValidator`] → [`TransactionAdmissionService`] →
//!   [`DuplicateResolver`] (only on a unique-constraint conflict)
//! - **Asynchronous**: [`EventIdempotencyGate`] → [`EnvelopeValidator`] →
//!   [`EventMapper`] → [`TransactionAdmissionService`] → gate finalize →
//!   [`DeadLetterPublisher`] (only on a terminal failure), driven by the
//!   [`EventProcessor`]
//!
//! ## Design Principles
//!
//! 1. **Store-enforced uniqueness**: no in-process lock guards admission; the
//!    store's atomic unique constraints decide, and a conflict is a value
//!    ([`InsertOutcome::Conflict`]), not an exception
//! 2. **Replay is success**: an identical resubmission returns the stored
//!    record; a different one sharing its natural key is refused loudly
//! 3. **Independent audit**: gate claims and outcomes are committed on their
//!    own, apart from the admission they guard
//! 4. **Tolerant decoding**: event payload fields that cannot be coerced
//!    become absent and are reported by the validator

#![warn(missing_docs)]

pub mod admission;
pub mod api;
pub mod broker;
pub mod config;
pub mod dead_letter;
pub mod duplicates;
pub mod errors;
pub mod event_mapper;
pub mod event_processor;
pub mod events;
pub mod idempotency;
pub mod infrastructure;
pub mod persistence;
pub mod queries;
pub mod service;
pub mod transaction;
pub mod validation;

pub use admission::{Admission, TransactionAdmissionService};
pub use api::{ErrorBody, SubmissionReceipt};
pub use broker::{Acknowledgment, BrokerError, DeliveryContext};
pub use config::{ConfigError, IntakeConfig};
pub use dead_letter::{
    DeadLetterHeaders, DeadLetterMessage, DeadLetterPublisher, DeadLetterSink,
    InMemoryDeadLetterSink,
};
pub use duplicates::{DuplicateResolver, FieldDifference};
pub use errors::{IntakeError, IntakeResult};
pub use event_mapper::EventMapper;
pub use event_processor::{EventProcessor, ProcessingOutcome, ProcessingState};
pub use events::{EnvelopeValidator, EventPayload, TransactionEvent};
pub use idempotency::{spawn_housekeeping, EventIdempotencyGate, GateDecision};
pub use persistence::{
    ConflictKind, EventStatus, InMemoryProcessedEventStore, InMemoryTransactionStore,
    InsertOutcome, ProcessedEvent, ProcessedEventStore, RecordFilter, StoreError,
    TransactionStore,
};
pub use queries::{StoreStatistics, TransactionQueryService};
pub use service::IntakeService;
pub use transaction::{
    LineItem, LineItemRecord, NaturalKey, NewTransaction, PaymentMethod, TransactionCommand,
    TransactionId, TransactionRecord, TransactionStatus, DEFAULT_CURRENCY,
};
pub use validation::CommandValidator;
