// Copyright 2025 Cowboy AI, LLC.

//! Transaction admission
//!
//! Both ingress paths end here. The insert itself is the only guard against
//! double admission: a unique-constraint conflict is routed to the
//! [`DuplicateResolver`] instead of being pre-checked.

use crate::duplicates::DuplicateResolver;
use crate::errors::{IntakeError, IntakeResult};
use crate::persistence::{InsertOutcome, TransactionStore};
use crate::transaction::{NewTransaction, TransactionCommand, TransactionId, TransactionRecord};
use crate::validation::CommandValidator;
use std::sync::Arc;
use tracing::{debug, info};

/// What admission did with a command
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// A new record was written
    Created(TransactionRecord),
    /// An identical record already existed and was returned unchanged
    Replayed(TransactionRecord),
}

impl Admission {
    /// The admitted record
    pub fn record(&self) -> &TransactionRecord {
        match self {
            Admission::Created(record) | Admission::Replayed(record) => record,
        }
    }

    /// Take the admitted record
    pub fn into_record(self) -> TransactionRecord {
        match self {
            Admission::Created(record) | Admission::Replayed(record) => record,
        }
    }

    /// Whether this admission wrote a new record
    pub fn is_created(&self) -> bool {
        matches!(self, Admission::Created(_))
    }
}

/// Validates, assigns an id to and persists transaction commands
#[derive(Clone)]
pub struct TransactionAdmissionService {
    store: Arc<dyn TransactionStore>,
    validator: CommandValidator,
    resolver: DuplicateResolver,
}

impl TransactionAdmissionService {
    /// Create a service writing to `store`
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            resolver: DuplicateResolver::new(store.clone()),
            validator: CommandValidator::new(),
            store,
        }
    }

    /// Validate and admit a command
    pub async fn submit(&self, command: TransactionCommand) -> IntakeResult<Admission> {
        info!(
            store_id = ?command.store_id,
            till_id = ?command.till_id,
            timestamp = ?command.timestamp,
            "Received transaction"
        );
        self.validator.validate(&command)?;
        self.admit(command).await
    }

    /// Admit a command that has already been validated
    pub async fn admit(&self, command: TransactionCommand) -> IntakeResult<Admission> {
        let transaction_id = match command.supplied_id() {
            Some(supplied) => TransactionId::parse(supplied)?,
            None => TransactionId::generate(),
        };
        debug!(transaction_id = %transaction_id, "Assigned business id");

        let new_transaction = NewTransaction::from_command(&command, transaction_id)?;
        let outcome = self.store.insert(new_transaction).await.map_err(|e| {
            IntakeError::processing(format!("Failed to process transaction: {e}"))
        })?;

        match outcome {
            InsertOutcome::Admitted(record) => {
                info!(
                    transaction_id = %record.transaction_id,
                    store_id = %record.store_id,
                    till_id = %record.till_id,
                    timestamp = %record.timestamp.to_rfc3339(),
                    "Transaction saved"
                );
                Ok(Admission::Created(record))
            }
            InsertOutcome::Conflict(kind) => {
                debug!(?kind, "Insert hit a unique constraint, resolving duplicate");
                self.resolver.resolve(&command).await.map(Admission::Replayed)
            }
        }
    }
}
