// Copyright 2025 Cowboy AI, LLC.

//! Event processing orchestrator
//!
//! Runs one delivered event through gate, validation, mapping and admission,
//! and is the only place where an error becomes an acknowledge-or-retry
//! decision:
//!
//! ```text
//! Received -> Duplicate                         (ack)
//!          -> Validating -> Mapping -> Admitting
//!                                      -> Completed          (finalize COMPLETED, ack)
//!                                      -> FailedNonRetriable (finalize FAILED, dead-letter, ack)
//!                                      -> FailedRetriable    (finalize FAILED, no ack, error)
//! ```

use crate::admission::TransactionAdmissionService;
use crate::broker::{Acknowledgment, DeliveryContext};
use crate::dead_letter::DeadLetterPublisher;
use crate::errors::{IntakeError, IntakeResult};
use crate::event_mapper::EventMapper;
use crate::events::{EnvelopeValidator, TransactionEvent};
use crate::idempotency::{EventIdempotencyGate, GateDecision};
use crate::persistence::EventStatus;
use crate::transaction::TransactionRecord;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Processing state of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    /// Delivered, not yet claimed
    Received,
    /// Already claimed by an earlier delivery
    Duplicate,
    /// Envelope being checked
    Validating,
    /// Payload being converted into a command
    Mapping,
    /// Command being admitted
    Admitting,
    /// Admitted
    Completed,
    /// Failed in a way redelivery cannot fix
    FailedNonRetriable,
    /// Failed in a way redelivery might fix
    FailedRetriable,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingState::Received => "RECEIVED",
            ProcessingState::Duplicate => "DUPLICATE",
            ProcessingState::Validating => "VALIDATING",
            ProcessingState::Mapping => "MAPPING",
            ProcessingState::Admitting => "ADMITTING",
            ProcessingState::Completed => "COMPLETED",
            ProcessingState::FailedNonRetriable => "FAILED_NONRETRIABLE",
            ProcessingState::FailedRetriable => "FAILED_RETRIABLE",
        };
        f.write_str(name)
    }
}

/// How an acknowledged event ended
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// The transaction was admitted (or replayed)
    Completed(TransactionRecord),
    /// The event had already been claimed
    Duplicate {
        /// Status recorded by the earlier claim, if read
        status: Option<EventStatus>,
    },
    /// The event was dead-lettered
    DeadLettered(IntakeError),
}

/// Drives events from the broker through the admission pipeline
#[derive(Clone)]
pub struct EventProcessor {
    gate: EventIdempotencyGate,
    envelope_validator: EnvelopeValidator,
    mapper: EventMapper,
    admission: TransactionAdmissionService,
    dead_letters: DeadLetterPublisher,
}

impl EventProcessor {
    /// Assemble a processor from its collaborators
    pub fn new(
        gate: EventIdempotencyGate,
        admission: TransactionAdmissionService,
        dead_letters: DeadLetterPublisher,
    ) -> Self {
        Self {
            gate,
            envelope_validator: EnvelopeValidator::new(),
            mapper: EventMapper::new(),
            admission,
            dead_letters,
        }
    }

    /// The dead-letter publisher used for terminal failures
    pub fn dead_letters(&self) -> &DeadLetterPublisher {
        &self.dead_letters
    }

    /// Process one delivered event
    ///
    /// `event` is `None` for a null message body. On `Ok` the message has been
    /// acknowledged; on `Err` it has not and the broker will redeliver it.
    pub async fn process(
        &self,
        event: Option<&TransactionEvent>,
        origin: &DeliveryContext,
        ack: &dyn Acknowledgment,
    ) -> IntakeResult<ProcessingOutcome> {
        let event_id = event.and_then(TransactionEvent::id);
        info!(
            topic = %origin.topic,
            partition = origin.partition,
            offset = origin.offset,
            event_id = ?event_id,
            "Received transaction event"
        );

        // Without an id there is nothing to claim: dead-letter straight away
        let (event, event_id) = match (event, event_id) {
            (Some(event), Some(event_id)) => (event, event_id),
            _ => {
                let failure = match self.envelope_validator.validate(event) {
                    Err(e) => e,
                    Ok(()) => IntakeError::validation("eventId", "Event ID is required"),
                };
                return self.reject_unclaimed(event, failure, origin, ack).await;
            }
        };

        let mut state = ProcessingState::Received;
        let decision = self
            .gate
            .try_acquire(event_id, event.kind())
            .await
            .map_err(|e| {
                error!(
                    event_id,
                    error = %e,
                    "Failed to acquire processing lock, leaving for redelivery"
                );
                IntakeError::processing(format!("Failed to acquire processing lock: {e}"))
            })?;

        if let GateDecision::Duplicate { status } = decision {
            transition(event_id, &mut state, ProcessingState::Duplicate);
            acknowledge(event_id, ack).await;
            return Ok(ProcessingOutcome::Duplicate { status });
        }

        match self.admit(event, event_id, &mut state).await {
            Ok(record) => {
                transition(event_id, &mut state, ProcessingState::Completed);
                if let Err(e) = self.gate.mark_completed(event_id).await {
                    error!(event_id, error = %e, "Failed to mark event as completed");
                }
                acknowledge(event_id, ack).await;
                info!(
                    event_id,
                    transaction_id = %record.transaction_id,
                    "Successfully processed transaction event"
                );
                Ok(ProcessingOutcome::Completed(record))
            }
            Err(failure) if failure.is_retriable() => {
                transition(event_id, &mut state, ProcessingState::FailedRetriable);
                error!(
                    event_id,
                    error = %failure,
                    "Retriable failure processing event, leaving for redelivery"
                );
                self.record_failure(event_id, &failure).await;
                Err(failure)
            }
            Err(failure) => {
                transition(event_id, &mut state, ProcessingState::FailedNonRetriable);
                error!(
                    event_id,
                    error_type = failure.kind(),
                    error = %failure,
                    "Non-retriable failure processing event, sending to dead-letter"
                );
                self.record_failure(event_id, &failure).await;
                self.dead_letters.publish_event(event, &failure, origin).await;
                acknowledge(event_id, ack).await;
                Ok(ProcessingOutcome::DeadLettered(failure))
            }
        }
    }

    async fn admit(
        &self,
        event: &TransactionEvent,
        event_id: &str,
        state: &mut ProcessingState,
    ) -> IntakeResult<TransactionRecord> {
        transition(event_id, state, ProcessingState::Validating);
        self.envelope_validator.validate(Some(event))?;

        transition(event_id, state, ProcessingState::Mapping);
        let command = self.mapper.to_command(event);

        transition(event_id, state, ProcessingState::Admitting);
        let admission = self.admission.submit(command).await?;
        Ok(admission.into_record())
    }

    async fn record_failure(&self, event_id: &str, failure: &IntakeError) {
        if let Err(e) = self.gate.mark_failed(event_id, &failure.audit_message()).await {
            error!(event_id, error = %e, "Failed to mark event as failed");
        }
    }

    async fn reject_unclaimed(
        &self,
        event: Option<&TransactionEvent>,
        failure: IntakeError,
        origin: &DeliveryContext,
        ack: &dyn Acknowledgment,
    ) -> IntakeResult<ProcessingOutcome> {
        error!(error = %failure, origin = %origin, "Rejected event without a usable event id");
        match event {
            Some(event) => {
                self.dead_letters.publish_event(event, &failure, origin).await;
            }
            None => {
                self.dead_letters
                    .publish_raw(
                        None,
                        bytes::Bytes::from_static(b"null"),
                        failure.kind(),
                        &failure.to_string(),
                        origin,
                    )
                    .await;
            }
        }
        acknowledge("<none>", ack).await;
        Ok(ProcessingOutcome::DeadLettered(failure))
    }
}

fn transition(event_id: &str, state: &mut ProcessingState, next: ProcessingState) {
    debug!(event_id, from = %state, to = %next, "Event state transition");
    *state = next;
}

async fn acknowledge(event_id: &str, ack: &dyn Acknowledgment) {
    if let Err(e) = ack.acknowledge().await {
        warn!(event_id, error = %e, "Failed to acknowledge message");
    }
}
