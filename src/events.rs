// Copyright 2025 Cowboy AI, LLC.

//! Transaction events consumed from the broker
//!
//! The envelope is typed; its `data` payload is an untyped JSON map produced
//! by an external system. The [`EnvelopeValidator`] only checks presence here:
//! type coercion belongs to [`crate::event_mapper::EventMapper`].

use crate::errors::{IntakeError, IntakeResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Untyped event payload
pub type EventPayload = Map<String, Value>;

/// Payload fields that must be present and non-blank
pub const REQUIRED_PAYLOAD_FIELDS: [&str; 5] =
    ["storeId", "tillId", "paymentMethod", "totalAmount", "timestamp"];

/// Envelope of a transaction event as published on the broker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    /// Producer-assigned unique id, the idempotency key
    pub event_id: Option<String>,
    /// Kind of event, e.g. `TRANSACTION_CREATED`
    pub event_type: Option<String>,
    /// When the producer emitted the event
    pub event_timestamp: Option<String>,
    /// Producing system
    pub source: Option<String>,
    /// Envelope schema version
    pub version: Option<String>,
    /// Transaction payload
    pub data: Option<EventPayload>,
}

impl TransactionEvent {
    /// Event id, ignoring blank strings
    pub fn id(&self) -> Option<&str> {
        self.event_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Event type, or an empty string
    pub fn kind(&self) -> &str {
        self.event_type.as_deref().unwrap_or_default()
    }
}

/// Checks an envelope before its payload is mapped
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeValidator;

impl EnvelopeValidator {
    /// Create a validator
    pub fn new() -> Self {
        Self
    }

    /// Validate an envelope; `None` stands for a null message body
    pub fn validate(&self, event: Option<&TransactionEvent>) -> IntakeResult<()> {
        let event = event.ok_or_else(|| IntakeError::validation("event", "Event cannot be null"))?;

        if event.id().is_none() {
            return Err(IntakeError::validation("eventId", "Event ID is required"));
        }
        if is_blank(event.event_type.as_deref()) {
            return Err(IntakeError::validation("eventType", "Event type is required"));
        }

        let data = match &event.data {
            Some(data) if !data.is_empty() => data,
            _ => {
                return Err(IntakeError::validation(
                    "data",
                    "Event data cannot be null or empty",
                ))
            }
        };

        for field in REQUIRED_PAYLOAD_FIELDS {
            validate_required_field(data, field)?;
        }

        debug!(event_id = ?event.event_id, "Event validation passed");
        Ok(())
    }
}

fn validate_required_field(data: &EventPayload, field: &str) -> IntakeResult<()> {
    match data.get(field) {
        None | Some(Value::Null) => Err(IntakeError::validation(
            field,
            format!("Required field '{field}' is missing in event data"),
        )),
        Some(Value::String(text)) if text.trim().is_empty() => Err(IntakeError::validation(
            field,
            format!("Required field '{field}' cannot be blank"),
        )),
        Some(_) => Ok(()),
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |text| text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn event(data: Value) -> TransactionEvent {
        serde_json::from_value(json!({
            "eventId": "E1",
            "eventType": "TRANSACTION_CREATED",
            "eventTimestamp": "2024-01-01T10:00:01Z",
            "source": "till-simulator",
            "version": "1.0",
            "data": data
        }))
        .unwrap()
    }

    fn full_payload() -> Value {
        json!({
            "storeId": "S1",
            "tillId": "T1",
            "paymentMethod": "card",
            "totalAmount": 7.69,
            "timestamp": "2024-01-01T10:00:00Z"
        })
    }

    fn failing_field(event: Option<&TransactionEvent>) -> String {
        match EnvelopeValidator::new().validate(event) {
            Err(IntakeError::Validation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_complete_envelope_passes() {
        assert_eq!(EnvelopeValidator::new().validate(Some(&event(full_payload()))), Ok(()));
    }

    #[test]
    fn test_null_envelope_is_rejected() {
        assert_eq!(failing_field(None), "event");
    }

    #[test]
    fn test_blank_envelope_fields_are_rejected() {
        let mut blank_id = event(full_payload());
        blank_id.event_id = Some("  ".into());
        assert_eq!(failing_field(Some(&blank_id)), "eventId");

        let mut no_type = event(full_payload());
        no_type.event_type = None;
        assert_eq!(failing_field(Some(&no_type)), "eventType");

        assert_eq!(failing_field(Some(&event(json!({})))), "data");
        assert_eq!(failing_field(Some(&event(Value::Null))), "data");
    }

    #[test_case("storeId")]
    #[test_case("tillId")]
    #[test_case("paymentMethod")]
    #[test_case("totalAmount")]
    #[test_case("timestamp")]
    fn test_missing_payload_field_is_named(field: &str) {
        let mut payload = full_payload();
        payload.as_object_mut().unwrap().remove(field);
        assert_eq!(failing_field(Some(&event(payload))), field);
    }

    #[test]
    fn test_blank_string_payload_field_is_rejected() {
        let mut payload = full_payload();
        payload["tillId"] = json!("   ");
        assert_eq!(failing_field(Some(&event(payload))), "tillId");
    }

    #[test]
    fn test_presence_only_no_type_checks() {
        let mut payload = full_payload();
        payload["totalAmount"] = json!("not-a-number");
        assert_eq!(EnvelopeValidator::new().validate(Some(&event(payload))), Ok(()));
    }
}
