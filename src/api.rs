// Copyright 2025 Cowboy AI, LLC.

//! Response bodies for synchronous submission
//!
//! No router is provided; an HTTP layer serializes these bodies and uses
//! [`ErrorBody::status_code`] for the response status.

use crate::admission::Admission;
use crate::errors::IntakeError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body returned for an admitted (or replayed) transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    /// Always `success`
    pub status: String,
    /// Human readable summary
    pub message: String,
    /// Assigned business id
    pub transaction_id: String,
    /// Instant the sale was rung up
    pub timestamp: DateTime<Utc>,
}

impl From<&Admission> for SubmissionReceipt {
    fn from(admission: &Admission) -> Self {
        let record = admission.record();
        Self {
            status: "success".to_string(),
            message: "Transaction processed successfully".to_string(),
            transaction_id: record.transaction_id.to_string(),
            timestamp: record.timestamp,
        }
    }
}

/// Body returned for a rejected submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Always `error`
    pub status: String,
    /// Human readable summary
    pub message: String,
    /// Short error description
    pub error: String,
    /// Field-level messages for validation failures
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    /// Sum of line items, for a receipt mismatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_total: Option<Decimal>,
    /// Declared total, for a receipt mismatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided_total: Option<Decimal>,
    #[serde(skip)]
    status_code: u16,
}

impl ErrorBody {
    /// HTTP status matching the error class
    pub fn status_code(&self) -> u16 {
        self.status_code
    }
}

impl From<&IntakeError> for ErrorBody {
    fn from(error: &IntakeError) -> Self {
        let body = |status_code: u16, message: &str, detail: String| ErrorBody {
            status: "error".to_string(),
            message: message.to_string(),
            error: detail,
            errors: BTreeMap::new(),
            calculated_total: None,
            provided_total: None,
            status_code,
        };

        match error {
            IntakeError::Validation { field, message } => ErrorBody {
                errors: BTreeMap::from([(field.clone(), message.clone())]),
                ..body(400, "Invalid transaction data", message.clone())
            },
            IntakeError::ReceiptTotalMismatch {
                calculated_total,
                provided_total,
            } => ErrorBody {
                calculated_total: Some(*calculated_total),
                provided_total: Some(*provided_total),
                ..body(422, "Receipt total mismatch", "Totals do not match".to_string())
            },
            IntakeError::InvalidState(message) => {
                body(500, message, "Internal server error".to_string())
            }
            IntakeError::Processing(message) => {
                body(500, message, "Internal server error".to_string())
            }
        }
    }
}
