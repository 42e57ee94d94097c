// Copyright 2025 Cowboy AI, LLC.

//! Command validation
//!
//! Structural completeness first, then per-item checks, then the receipt
//! reconciliation rule: the line items must add up to the declared total
//! exactly, with no rounding tolerance.

use crate::errors::{IntakeError, IntakeResult};
use crate::transaction::{PaymentMethod, TransactionCommand, TransactionId};
use rust_decimal::Decimal;
use tracing::error;

/// Smallest admissible receipt total (one penny)
pub const MINIMUM_TOTAL: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Validates [`TransactionCommand`]s before they reach a store
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandValidator;

impl CommandValidator {
    /// Create a validator
    pub fn new() -> Self {
        Self
    }

    /// Validate a command, returning the first problem found
    pub fn validate(&self, command: &TransactionCommand) -> IntakeResult<()> {
        self.validate_required_fields(command)?;
        self.validate_items(command)?;
        self.validate_receipt_total(command)
    }

    fn validate_required_fields(&self, command: &TransactionCommand) -> IntakeResult<()> {
        require_text(command.store_id.as_deref(), "storeId", "Store ID is required")?;
        require_text(command.till_id.as_deref(), "tillId", "Till ID is required")?;
        require_text(
            command.payment_method.as_deref(),
            "paymentMethod",
            "Payment method is required",
        )?;

        let total_amount = command
            .total_amount
            .ok_or_else(|| IntakeError::validation("totalAmount", "Total amount is required"))?;
        if command.timestamp.is_none() {
            return Err(IntakeError::validation(
                "timestamp",
                "Transaction creation time is required",
            ));
        }
        if total_amount < MINIMUM_TOTAL {
            return Err(IntakeError::validation(
                "totalAmount",
                "Total amount must be greater than zero",
            ));
        }

        if let Some(transaction_id) = command.supplied_id() {
            TransactionId::parse(transaction_id)?;
        }

        command
            .payment_method
            .as_deref()
            .unwrap_or_default()
            .parse::<PaymentMethod>()?;

        Ok(())
    }

    fn validate_items(&self, command: &TransactionCommand) -> IntakeResult<()> {
        for (index, item) in command.items.iter().enumerate() {
            let field = format!("items[{index}]");
            match item.unit_price {
                None => {
                    return Err(IntakeError::validation(
                        &field,
                        format!("Item at index {index}: Unit price is required"),
                    ))
                }
                Some(price) if price < Decimal::ZERO => {
                    return Err(IntakeError::validation(
                        &field,
                        format!("Item at index {index}: Unit price cannot be negative"),
                    ))
                }
                Some(_) => {}
            }
            match item.quantity {
                None => {
                    return Err(IntakeError::validation(
                        &field,
                        format!("Item at index {index}: Quantity is required"),
                    ))
                }
                Some(quantity) if quantity <= 0 => {
                    return Err(IntakeError::validation(
                        &field,
                        format!("Item at index {index}: Quantity must be greater than zero"),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn validate_receipt_total(&self, command: &TransactionCommand) -> IntakeResult<()> {
        if command.items.is_empty() {
            return Ok(());
        }
        let Some(provided_total) = command.total_amount else {
            return Ok(());
        };

        let calculated_total = calculate_total(command)?;
        if calculated_total != provided_total {
            error!(
                calculated_total = %calculated_total,
                provided_total = %provided_total,
                "Calculated total doesn't match provided total"
            );
            return Err(IntakeError::ReceiptTotalMismatch {
                calculated_total,
                provided_total,
            });
        }
        Ok(())
    }
}

/// Sum of `unit_price * quantity` across all items
pub fn calculate_total(command: &TransactionCommand) -> IntakeResult<Decimal> {
    command
        .items
        .iter()
        .try_fold(Decimal::ZERO, |total, item| {
            item.subtotal().and_then(|subtotal| total.checked_add(subtotal))
        })
        .ok_or_else(|| IntakeError::validation("items", "Receipt total is out of range"))
}

fn require_text(value: Option<&str>, field: &str, message: &str) -> IntakeResult<()> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(()),
        _ => Err(IntakeError::validation(field, message)),
    }
}
