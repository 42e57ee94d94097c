// Copyright 2025 Cowboy AI, LLC.

//! Event payload to command mapping
//!
//! Decoding is tolerant: a field that cannot be coerced becomes `None` (with a
//! warning) and the command validator reports it as missing. A line item that
//! cannot be mapped is skipped on its own without failing the batch.

use crate::events::{EventPayload, TransactionEvent};
use crate::transaction::{LineItem, TransactionCommand};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

/// Converts [`TransactionEvent`] payloads into [`TransactionCommand`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct EventMapper;

impl EventMapper {
    /// Create a mapper
    pub fn new() -> Self {
        Self
    }

    /// Map an event's payload to a command; never fails
    pub fn to_command(&self, event: &TransactionEvent) -> TransactionCommand {
        let empty = EventPayload::new();
        let data = event.data.as_ref().unwrap_or(&empty);

        TransactionCommand {
            transaction_id: extract_string(data, "transactionId"),
            customer_id: extract_string(data, "customerId"),
            store_id: extract_string(data, "storeId"),
            till_id: extract_string(data, "tillId"),
            payment_method: extract_string(data, "paymentMethod"),
            total_amount: extract_decimal(data, "totalAmount"),
            currency: extract_string(data, "currency"),
            timestamp: extract_instant(data, "timestamp"),
            items: extract_items(data),
        }
    }
}

fn extract_string(data: &EventPayload, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn extract_decimal(data: &EventPayload, key: &str) -> Option<Decimal> {
    let value = data.get(key)?;
    let parsed = match value {
        Value::Null => return None,
        // Shortest round-trip form of the f64, so 7.69 maps to 7.69 rather than
        // the binary expansion of the float
        Value::Number(number) => parse_decimal(&number.to_string()),
        Value::String(text) => parse_decimal(text),
        _ => None,
    };
    if parsed.is_none() {
        warn!(key, value = %value, "Failed to convert value to decimal");
    }
    parsed
}

fn extract_integer(data: &EventPayload, key: &str) -> Option<i64> {
    let value = data.get(key)?;
    let parsed = match value {
        Value::Null => return None,
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && float.abs() < i64::MAX as f64)
                .map(|float| float.trunc() as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        warn!(key, value = %value, "Failed to convert value to integer");
    }
    parsed
}

fn extract_instant(data: &EventPayload, key: &str) -> Option<DateTime<Utc>> {
    let value = data.get(key)?;
    let parsed = match value {
        Value::Null => return None,
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .map(|instant| instant.with_timezone(&Utc))
            .ok(),
        // Already-structured instants arrive as epoch seconds with a fraction
        Value::Number(number) => parse_decimal(&number.to_string()).and_then(epoch_seconds),
        _ => None,
    };
    if parsed.is_none() {
        warn!(key, value = %value, "Failed to parse timestamp");
    }
    parsed
}

fn epoch_seconds(seconds: Decimal) -> Option<DateTime<Utc>> {
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * Decimal::from(1_000_000_000u32)).trunc();
    let whole = i64::try_from(whole).ok()?;
    let nanos = u32::try_from(nanos).ok()?;
    DateTime::from_timestamp(whole, nanos)
}

fn extract_items(data: &EventPayload) -> Vec<LineItem> {
    let items = match data.get("items") {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!(items = %other, "Items field is not a list");
            return Vec::new();
        }
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match item {
            Value::Object(fields) => Some(LineItem {
                product_name: extract_string(fields, "productName"),
                product_code: extract_string(fields, "productCode"),
                unit_price: extract_decimal(fields, "unitPrice"),
                quantity: extract_integer(fields, "quantity"),
                category: extract_string(fields, "category"),
            }),
            other => {
                warn!(index, item = %other, "Failed to map transaction item, skipping");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn event(data: Value) -> TransactionEvent {
        TransactionEvent {
            event_id: Some("E1".into()),
            event_type: Some("TRANSACTION_CREATED".into()),
            data: data.as_object().cloned(),
            ..Default::default()
        }
    }

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn test_maps_full_payload() {
        let command = EventMapper::new().to_command(&event(json!({
            "transactionId": "TXN-0F8FAD5B-D9CB-469F-A165-70867728950E",
            "customerId": "C1",
            "storeId": "S1",
            "tillId": "T1",
            "paymentMethod": "card",
            "totalAmount": 7.69,
            "currency": "GBP",
            "timestamp": "2024-01-01T10:00:00Z",
            "items": [
                {
                    "productName": "Milk",
                    "productCode": "MILK001",
                    "unitPrice": 2.50,
                    "quantity": 1,
                    "category": "Dairy"
                },
                {"productName": "Bread", "unitPrice": "1.20", "quantity": "1"},
                {"productName": "Coffee", "unitPrice": 3.99, "quantity": 1.0}
            ]
        })));

        assert_eq!(command.store_id.as_deref(), Some("S1"));
        assert_eq!(command.total_amount, Some(dec("7.69")));
        assert_eq!(
            command.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(command.items.len(), 3);
        assert_eq!(command.items[0].unit_price, Some(dec("2.5")));
        assert_eq!(command.items[1].unit_price, Some(dec("1.20")));
        assert_eq!(command.items[1].quantity, Some(1));
        assert_eq!(command.items[2].quantity, Some(1));
        assert_eq!(command.items[1].product_code, None);
    }

    #[test]
    fn test_float_amounts_keep_their_written_digits() {
        let command = EventMapper::new().to_command(&event(json!({
            "totalAmount": 0.1,
            "items": [{"unitPrice": 19.99, "quantity": 3}]
        })));
        assert_eq!(command.total_amount, Some(dec("0.1")));
        assert_eq!(command.items[0].unit_price.unwrap().to_string(), "19.99");
    }

    #[test]
    fn test_unparsable_amount_becomes_missing() {
        let command = EventMapper::new().to_command(&event(json!({
            "storeId": "S1",
            "totalAmount": "seven pounds",
            "timestamp": "yesterday"
        })));
        assert_eq!(command.total_amount, None);
        assert_eq!(command.timestamp, None);
        assert_eq!(command.store_id.as_deref(), Some("S1"));
    }

    #[test]
    fn test_numeric_strings_and_scientific_notation() {
        let command = EventMapper::new().to_command(&event(json!({
            "totalAmount": "1.5e1"
        })));
        assert_eq!(command.total_amount, Some(dec("15")));
    }

    #[test]
    fn test_epoch_seconds_timestamp() {
        let command = EventMapper::new().to_command(&event(json!({
            "timestamp": 1704103200.25
        })));
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(command.timestamp, Some(expected));
    }

    #[test]
    fn test_offset_timestamp_is_normalised_to_utc() {
        let command = EventMapper::new().to_command(&event(json!({
            "timestamp": "2024-01-01T11:00:00+01:00"
        })));
        assert_eq!(
            command.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_bad_item_is_skipped_individually() {
        let command = EventMapper::new().to_command(&event(json!({
            "items": [
                {"productName": "Milk", "unitPrice": 2.50, "quantity": 1},
                "not an item",
                42,
                {"productName": "Bread", "unitPrice": "oops", "quantity": 1}
            ]
        })));
        assert_eq!(command.items.len(), 2);
        assert_eq!(command.items[0].product_name.as_deref(), Some("Milk"));
        // A bad field inside an item leaves the field empty for the validator
        assert_eq!(command.items[1].unit_price, None);
    }

    #[test]
    fn test_items_not_a_list() {
        let command = EventMapper::new().to_command(&event(json!({ "items": {"a": 1} })));
        assert!(command.items.is_empty());
    }

    #[test]
    fn test_missing_currency_falls_back_to_default() {
        let command = EventMapper::new().to_command(&event(json!({ "storeId": "S1" })));
        assert_eq!(command.currency, None);
        assert_eq!(command.currency(), "GBP");
    }

    #[test]
    fn test_non_string_ids_are_stringified() {
        let command = EventMapper::new().to_command(&event(json!({ "storeId": 101, "tillId": 7 })));
        assert_eq!(command.store_id.as_deref(), Some("101"));
        assert_eq!(command.till_id.as_deref(), Some("7"));
    }
}
