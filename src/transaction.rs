// Copyright 2025 Cowboy AI, LLC.

//! Transaction model: commands coming in, records going out
//!
//! A [`TransactionCommand`] is what a till or the event feed asks us to admit.
//! Every field the validator checks is an `Option`; absence is reported by
//! [`crate::validation::CommandValidator`]. A [`TransactionRecord`] is the
//! persisted result and is only ever produced by a store.

use crate::errors::{IntakeError, IntakeResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Currency used when a command does not carry one
pub const DEFAULT_CURRENCY: &str = "GBP";

/// Prefix shared by every business transaction id
pub const TRANSACTION_ID_PREFIX: &str = "TXN-";

/// How the customer paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Notes and coins
    Cash,
    /// Debit or credit card
    Card,
}

impl PaymentMethod {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = IntakeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "" => Err(IntakeError::validation(
                "paymentMethod",
                "Payment method is required",
            )),
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            _ => Err(IntakeError::validation(
                "paymentMethod",
                "Payment method must be 'cash' or 'card'",
            )),
        }
    }
}

/// Caller-facing transaction identifier: `TXN-` followed by an upper-case,
/// hyphenated UUID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generate a fresh id
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Parse a caller-supplied id and bring it into canonical form
    pub fn parse(raw: &str) -> IntakeResult<Self> {
        let trimmed = raw.trim();
        let suffix = trimmed.strip_prefix(TRANSACTION_ID_PREFIX).ok_or_else(|| {
            IntakeError::validation("transactionId", "Transaction ID must start with 'TXN-'")
        })?;

        // Only the hyphenated 36 character form is accepted
        if suffix.len() != 36 {
            return Err(invalid_uuid_suffix());
        }
        let uuid = Uuid::parse_str(suffix).map_err(|_| invalid_uuid_suffix())?;
        Ok(Self::from_uuid(uuid))
    }

    fn from_uuid(uuid: Uuid) -> Self {
        let hyphenated = uuid.hyphenated().to_string().to_uppercase();
        Self(format!("{TRANSACTION_ID_PREFIX}{hyphenated}"))
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn invalid_uuid_suffix() -> IntakeError {
    IntakeError::validation(
        "transactionId",
        "Transaction ID must have a valid UUID after 'TXN-' prefix",
    )
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (store, till, timestamp) triple identifying one real-world sale
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaturalKey {
    /// Store the till belongs to
    pub store_id: String,
    /// Till that rang the sale
    pub till_id: String,
    /// Instant the sale was rung up
    pub timestamp: DateTime<Utc>,
}

impl NaturalKey {
    /// Build the key from a command, reporting whichever part is missing
    pub fn from_command(command: &TransactionCommand) -> IntakeResult<Self> {
        Ok(Self {
            store_id: required_text(
                command.store_id.as_deref(),
                "storeId",
                "Store ID is required",
            )?,
            till_id: required_text(command.till_id.as_deref(), "tillId", "Till ID is required")?,
            timestamp: command.timestamp.ok_or_else(|| {
                IntakeError::validation("timestamp", "Transaction creation time is required")
            })?,
        })
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreId={}, TillId={}, Timestamp={}",
            self.store_id,
            self.till_id,
            self.timestamp.to_rfc3339()
        )
    }
}

/// One line on the receipt, as submitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Display name of the product
    pub product_name: Option<String>,
    /// Product code (SKU)
    pub product_code: Option<String>,
    /// Price per unit
    pub unit_price: Option<Decimal>,
    /// Units sold
    pub quantity: Option<i64>,
    /// Product category
    pub category: Option<String>,
}

impl LineItem {
    /// `unit_price * quantity`, if both are present and the product fits
    pub fn subtotal(&self) -> Option<Decimal> {
        let unit_price = self.unit_price?;
        let quantity = self.quantity?;
        unit_price.checked_mul(Decimal::from(quantity))
    }
}

/// Request to admit one transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCommand {
    /// Optional caller-supplied business id
    pub transaction_id: Option<String>,
    /// Loyalty customer, if known
    pub customer_id: Option<String>,
    /// Store the till belongs to
    pub store_id: Option<String>,
    /// Till that rang the sale
    pub till_id: Option<String>,
    /// Raw payment method, resolved by the validator
    pub payment_method: Option<String>,
    /// Declared receipt total
    pub total_amount: Option<Decimal>,
    /// ISO currency code; [`DEFAULT_CURRENCY`] when absent
    pub currency: Option<String>,
    /// Instant the sale was rung up
    pub timestamp: Option<DateTime<Utc>>,
    /// Receipt lines in till order
    #[serde(default)]
    pub items: Vec<LineItem>,
}

impl TransactionCommand {
    /// Currency, falling back to [`DEFAULT_CURRENCY`]
    pub fn currency(&self) -> &str {
        match self.currency.as_deref() {
            Some(currency) if !currency.trim().is_empty() => currency,
            _ => DEFAULT_CURRENCY,
        }
    }

    /// Caller-supplied id, ignoring blank strings
    pub fn supplied_id(&self) -> Option<&str> {
        self.transaction_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

/// Lifecycle status of an admitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Admitted and durable
    Completed,
}

/// A persisted receipt line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRecord {
    /// Display name of the product
    pub product_name: Option<String>,
    /// Product code (SKU)
    pub product_code: Option<String>,
    /// Price per unit
    pub unit_price: Decimal,
    /// Units sold
    pub quantity: i64,
    /// `unit_price * quantity`
    pub total_price: Decimal,
    /// Product category
    pub category: Option<String>,
}

/// A validated transaction ready to be inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    /// Business id
    pub transaction_id: TransactionId,
    /// Loyalty customer, if known
    pub customer_id: Option<String>,
    /// Store the till belongs to
    pub store_id: String,
    /// Till that rang the sale
    pub till_id: String,
    /// Resolved payment method
    pub payment_method: PaymentMethod,
    /// Declared receipt total
    pub total_amount: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Instant the sale was rung up
    pub timestamp: DateTime<Utc>,
    /// Receipt lines in till order
    pub items: Vec<LineItemRecord>,
}

impl NewTransaction {
    /// Convert a command that has already passed validation
    ///
    /// Missing fields are still reported as validation errors rather than
    /// assumed present.
    pub fn from_command(
        command: &TransactionCommand,
        transaction_id: TransactionId,
    ) -> IntakeResult<Self> {
        let key = NaturalKey::from_command(command)?;
        let payment_method: PaymentMethod =
            command.payment_method.as_deref().unwrap_or("").parse()?;
        let total_amount = command
            .total_amount
            .ok_or_else(|| IntakeError::validation("totalAmount", "Total amount is required"))?;

        let items = command
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| LineItemRecord::from_item(index, item))
            .collect::<IntakeResult<Vec<_>>>()?;

        Ok(Self {
            transaction_id,
            customer_id: command.customer_id.clone(),
            store_id: key.store_id,
            till_id: key.till_id,
            payment_method,
            total_amount,
            currency: command.currency().to_string(),
            timestamp: key.timestamp,
            items,
        })
    }

    /// The natural key of this transaction
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            store_id: self.store_id.clone(),
            till_id: self.till_id.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Attach the store-assigned surrogate id and creation time
    pub fn into_record(self, id: u64, created_at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            id,
            transaction_id: self.transaction_id,
            customer_id: self.customer_id,
            store_id: self.store_id,
            till_id: self.till_id,
            payment_method: self.payment_method,
            total_amount: self.total_amount,
            currency: self.currency,
            timestamp: self.timestamp,
            status: TransactionStatus::Completed,
            created_at,
            items: self.items,
        }
    }
}

impl LineItemRecord {
    fn from_item(index: usize, item: &LineItem) -> IntakeResult<Self> {
        let field = format!("items[{index}]");
        let unit_price = item.unit_price.ok_or_else(|| {
            IntakeError::validation(
                &field,
                format!("Item at index {index}: Unit price is required"),
            )
        })?;
        let quantity = item.quantity.ok_or_else(|| {
            IntakeError::validation(&field, format!("Item at index {index}: Quantity is required"))
        })?;
        let total_price = item.subtotal().ok_or_else(|| {
            IntakeError::validation(
                &field,
                format!("Item at index {index}: Subtotal is out of range"),
            )
        })?;

        Ok(Self {
            product_name: item.product_name.clone(),
            product_code: item.product_code.clone(),
            unit_price,
            quantity,
            total_price,
            category: item.category.clone(),
        })
    }
}

/// A persisted transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Store-assigned surrogate key
    pub id: u64,
    /// Business id
    pub transaction_id: TransactionId,
    /// Loyalty customer, if known
    pub customer_id: Option<String>,
    /// Store the till belongs to
    pub store_id: String,
    /// Till that rang the sale
    pub till_id: String,
    /// Resolved payment method
    pub payment_method: PaymentMethod,
    /// Declared receipt total
    pub total_amount: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Instant the sale was rung up
    pub timestamp: DateTime<Utc>,
    /// Lifecycle status
    pub status: TransactionStatus,
    /// When the record was written
    pub created_at: DateTime<Utc>,
    /// Receipt lines in till order
    pub items: Vec<LineItemRecord>,
}

impl TransactionRecord {
    /// The natural key of this transaction
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            store_id: self.store_id.clone(),
            till_id: self.till_id.clone(),
            timestamp: self.timestamp,
        }
    }
}

fn required_text(value: Option<&str>, field: &str, message: &str) -> IntakeResult<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(IntakeError::validation(field, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_generated_id_is_canonical() {
        let id = TransactionId::generate();
        assert!(id.as_str().starts_with("TXN-"));
        assert_eq!(id.as_str().len(), 4 + 36);
        assert_eq!(id.as_str(), id.as_str().to_uppercase());
        // A generated id must survive its own format check unchanged
        assert_eq!(TransactionId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_parse_canonicalises_lowercase_uuid() {
        let id = TransactionId::parse(" TXN-0f8fad5b-d9cb-469f-a165-70867728950e ").unwrap();
        assert_eq!(id.as_str(), "TXN-0F8FAD5B-D9CB-469F-A165-70867728950E");
    }

    #[test_case("TX-0f8fad5b-d9cb-469f-a165-70867728950e" ; "wrong prefix")]
    #[test_case("TXN-not-a-uuid" ; "garbage suffix")]
    #[test_case("TXN-0f8fad5bd9cb469fa16570867728950e" ; "unhyphenated")]
    #[test_case("TXN-" ; "empty suffix")]
    fn test_parse_rejects(raw: &str) {
        assert!(matches!(
            TransactionId::parse(raw),
            Err(IntakeError::Validation { ref field, .. }) if field == "transactionId"
        ));
    }

    #[test_case("cash", PaymentMethod::Cash)]
    #[test_case(" CARD ", PaymentMethod::Card)]
    #[test_case("Cash", PaymentMethod::Cash)]
    fn test_payment_method_parses(raw: &str, expected: PaymentMethod) {
        assert_eq!(raw.parse::<PaymentMethod>().unwrap(), expected);
    }

    #[test]
    fn test_payment_method_rejects_unknown() {
        let err = "voucher".parse::<PaymentMethod>().unwrap_err();
        assert_eq!(
            err,
            IntakeError::validation("paymentMethod", "Payment method must be 'cash' or 'card'")
        );
    }

    #[test]
    fn test_currency_defaults_when_absent_or_blank() {
        let mut command = TransactionCommand::default();
        assert_eq!(command.currency(), "GBP");
        command.currency = Some("  ".into());
        assert_eq!(command.currency(), "GBP");
        command.currency = Some("EUR".into());
        assert_eq!(command.currency(), "EUR");
    }

    #[test]
    fn test_subtotal_multiplies_exactly() {
        let item = LineItem {
            unit_price: Some(Decimal::from_str("3.99").unwrap()),
            quantity: Some(3),
            ..Default::default()
        };
        assert_eq!(item.subtotal(), Some(Decimal::from_str("11.97").unwrap()));
    }

    #[test]
    fn test_command_deserializes_camel_case_with_offset() {
        let command: TransactionCommand = serde_json::from_value(serde_json::json!({
            "storeId": "S1",
            "tillId": "T1",
            "paymentMethod": "card",
            "totalAmount": 7.69,
            "timestamp": "2024-01-01T11:00:00+01:00"
        }))
        .unwrap();

        assert_eq!(command.total_amount, Some(Decimal::from_str("7.69").unwrap()));
        assert_eq!(
            command.timestamp.unwrap().to_rfc3339(),
            "2024-01-01T10:00:00+00:00"
        );
        assert!(command.items.is_empty());
    }
}
