// Copyright 2025 Cowboy AI, LLC.

//! Duplicate resolution after a unique-constraint collision
//!
//! A collision on the natural key is either a retry of the same sale (return
//! what was stored) or two different sales claiming the same till and instant
//! (refuse loudly). A collision that is not on the natural key can only be two
//! different sales sharing a caller-supplied business id.

use crate::errors::{IntakeError, IntakeResult};
use crate::persistence::{StoreError, TransactionStore};
use crate::transaction::{
    LineItem, LineItemRecord, NaturalKey, PaymentMethod, TransactionCommand, TransactionId,
    TransactionRecord,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

/// One field that differs between the stored and the submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDifference {
    /// Field path, e.g. `paymentMethod` or `items[1].unitPrice`
    pub field: String,
    /// Stored value, `None` when absent
    pub existing: Option<String>,
    /// Submitted value, `None` when absent
    pub sent: Option<String>,
}

impl fmt::Display for FieldDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} existing={} sent={}",
            self.field,
            self.existing.as_deref().unwrap_or("null"),
            self.sent.as_deref().unwrap_or("null")
        )
    }
}

/// Decides between idempotent replay and a fatal anomaly
#[derive(Clone)]
pub struct DuplicateResolver {
    store: Arc<dyn TransactionStore>,
}

impl DuplicateResolver {
    /// Create a resolver reading from `store`
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    /// Resolve a collision for `command`
    ///
    /// Returns the stored record when the submission is identical to it.
    pub async fn resolve(&self, command: &TransactionCommand) -> IntakeResult<TransactionRecord> {
        let key = NaturalKey::from_command(command)?;
        let existing = self
            .store
            .find_by_natural_key(&key)
            .await
            .map_err(load_error)?;

        let Some(existing) = existing else {
            let transaction_id = command.supplied_id().unwrap_or("<generated>");
            error!(
                transaction_id,
                natural_key = %key,
                "Business id collision without a natural key match"
            );
            return Err(IntakeError::InvalidState(format!(
                "Duplicate transaction_id {transaction_id} detected, but no transaction with \
                 the same natural key ({key}) exists. Possible causes: a reused transaction id \
                 or an id generation fault"
            )));
        };

        let differences = diff(&existing, command);
        if !differences.is_empty() {
            let listed = differences
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            error!(
                store_id = %key.store_id,
                till_id = %key.till_id,
                timestamp = %key.timestamp.to_rfc3339(),
                existing_transaction_id = %existing.transaction_id,
                differences = %listed,
                "URGENT- Bad Transactions coming from StoreId {} TillID {} for the same timestamp, \
                 two different transaction reported!",
                key.store_id,
                key.till_id
            );
            return Err(IntakeError::InvalidState(format!(
                "URGENT- Bad Transactions coming from StoreId {} TillID {} for the same \
                 timestamp, two different transaction reported! Existing vs Sent: {listed}",
                key.store_id, key.till_id
            )));
        }

        // A record whose business id does not lead back to it may still be
        // withdrawn by the insert that wrote it
        let settled = self
            .store
            .find_by_business_id(&existing.transaction_id)
            .await
            .map_err(load_error)?;
        if settled.map(|record| record.natural_key()).as_ref() != Some(&key) {
            warn!(
                transaction_id = %existing.transaction_id,
                natural_key = %key,
                "Colliding transaction is not settled, leaving for retry"
            );
            return Err(IntakeError::processing(format!(
                "Colliding transaction {} for {key} is not settled yet",
                existing.transaction_id
            )));
        }

        warn!(
            transaction_id = %existing.transaction_id,
            natural_key = %key,
            "Duplicate submission of an identical transaction, returning existing record"
        );
        Ok(existing)
    }
}

fn load_error(err: StoreError) -> IntakeError {
    IntakeError::processing(format!("Failed to load colliding transaction: {err}"))
}

/// Every field on which `command` disagrees with `existing`
///
/// If the item counts differ the items are not compared pairwise.
pub fn diff(existing: &TransactionRecord, command: &TransactionCommand) -> Vec<FieldDifference> {
    let mut differences = Differences::default();

    // A generated id cannot disagree with anything
    if let Some(supplied) = command.supplied_id() {
        let sent = TransactionId::parse(supplied)
            .map(|id| id.to_string())
            .unwrap_or_else(|_| supplied.to_string());
        differences.text(
            "transactionId",
            Some(existing.transaction_id.as_str()),
            Some(sent.as_str()),
        );
    }
    differences.text(
        "customerId",
        existing.customer_id.as_deref(),
        command.customer_id.as_deref(),
    );
    differences.text("storeId", Some(existing.store_id.as_str()), command.store_id.as_deref());
    differences.text("tillId", Some(existing.till_id.as_str()), command.till_id.as_deref());
    differences.payment_method(existing.payment_method, command.payment_method.as_deref());
    differences.text("currency", Some(existing.currency.as_str()), Some(command.currency()));
    differences.decimal("totalAmount", Some(existing.total_amount), command.total_amount);
    differences.instant("timestamp", Some(existing.timestamp), command.timestamp);

    if existing.items.len() != command.items.len() {
        differences.push(
            "items.size",
            Some(existing.items.len().to_string()),
            Some(command.items.len().to_string()),
        );
        return differences.0;
    }

    for (index, (stored, sent)) in existing.items.iter().zip(&command.items).enumerate() {
        differences.item(index, stored, sent);
    }
    differences.0
}

#[derive(Default)]
struct Differences(Vec<FieldDifference>);

impl Differences {
    fn push(&mut self, field: impl Into<String>, existing: Option<String>, sent: Option<String>) {
        self.0.push(FieldDifference {
            field: field.into(),
            existing,
            sent,
        });
    }

    fn text(&mut self, field: &str, existing: Option<&str>, sent: Option<&str>) {
        if existing != sent {
            self.push(field, existing.map(str::to_string), sent.map(str::to_string));
        }
    }

    fn payment_method(&mut self, existing: PaymentMethod, sent: Option<&str>) {
        match sent.map(str::parse::<PaymentMethod>) {
            Some(Ok(method)) if method == existing => {}
            Some(Ok(method)) => self.push(
                "paymentMethod",
                Some(existing.to_string()),
                Some(method.to_string()),
            ),
            Some(Err(_)) => self.push(
                "paymentMethod",
                Some(existing.to_string()),
                sent.map(str::to_string),
            ),
            None => self.push("paymentMethod", Some(existing.to_string()), None),
        }
    }

    fn decimal(&mut self, field: &str, existing: Option<Decimal>, sent: Option<Decimal>) {
        // Decimal equality ignores scale: 2.5 == 2.50
        if existing != sent {
            self.push(
                field,
                existing.map(|v| v.to_string()),
                sent.map(|v| v.to_string()),
            );
        }
    }

    fn instant(
        &mut self,
        field: &str,
        existing: Option<DateTime<Utc>>,
        sent: Option<DateTime<Utc>>,
    ) {
        if existing != sent {
            self.push(
                field,
                existing.map(|v| v.to_rfc3339()),
                sent.map(|v| v.to_rfc3339()),
            );
        }
    }

    fn item(&mut self, index: usize, stored: &LineItemRecord, sent: &LineItem) {
        let field = |name: &str| format!("items[{index}].{name}");
        self.text(
            &field("productName"),
            stored.product_name.as_deref(),
            sent.product_name.as_deref(),
        );
        self.text(
            &field("productCode"),
            stored.product_code.as_deref(),
            sent.product_code.as_deref(),
        );
        self.decimal(&field("unitPrice"), Some(stored.unit_price), sent.unit_price);
        if Some(stored.quantity) != sent.quantity {
            self.push(
                field("quantity"),
                Some(stored.quantity.to_string()),
                sent.quantity.map(|q| q.to_string()),
            );
        }
        self.text(
            &field("category"),
            stored.category.as_deref(),
            sent.category.as_deref(),
        );
    }
}
