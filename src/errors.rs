// Copyright 2025 Cowboy AI, LLC.

//! Error types for transaction admission

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while admitting a transaction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntakeError {
    /// A required field is missing or malformed
    #[error("Validation error on {field}: {message}")]
    Validation {
        /// Name of the failing field
        field: String,
        /// Human readable reason
        message: String,
    },

    /// The line items do not add up to the declared total
    #[error("Receipt total mismatch: calculated {calculated_total}, provided {provided_total}")]
    ReceiptTotalMismatch {
        /// Sum of unit price times quantity over all items
        calculated_total: Decimal,
        /// Total declared by the till
        provided_total: Decimal,
    },

    /// Two materially different transactions collided on a unique key
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Unexpected internal failure
    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for admission operations
pub type IntakeResult<T> = Result<T, IntakeError>;

impl IntakeError {
    /// Create a validation error for a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        IntakeError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a processing error
    pub fn processing(message: impl Into<String>) -> Self {
        IntakeError::Processing(message.into())
    }

    /// Whether redelivering the triggering message could succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, IntakeError::Processing(_))
    }

    /// Stable type name, used in dead-letter headers
    pub fn kind(&self) -> &'static str {
        match self {
            IntakeError::Validation { .. } => "ValidationError",
            IntakeError::ReceiptTotalMismatch { .. } => "ReceiptTotalMismatch",
            IntakeError::InvalidState(_) => "InvalidState",
            IntakeError::Processing(_) => "ProcessingError",
        }
    }

    /// Text recorded against a failed event in the audit table
    pub fn audit_message(&self) -> String {
        match self {
            IntakeError::Validation { message, .. } => format!("Validation error: {message}"),
            IntakeError::ReceiptTotalMismatch {
                calculated_total,
                provided_total,
            } => format!(
                "Receipt total mismatch: calculated={calculated_total}, provided={provided_total}"
            ),
            IntakeError::InvalidState(message) => format!("Invalid state: {message}"),
            IntakeError::Processing(message) => format!("Processing error: {message}"),
        }
    }
}

impl From<crate::persistence::StoreError> for IntakeError {
    fn from(err: crate::persistence::StoreError) -> Self {
        IntakeError::Processing(err.to_string())
    }
}
