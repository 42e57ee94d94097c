// Copyright 2025 Cowboy AI, LLC.

//! Runtime configuration
//!
//! Defaults suit a local NATS server. [`IntakeConfig::from_env`] overlays
//! `INTAKE_*` environment variables on top of them.

use crate::infrastructure::{EventConsumerConfig, NatsConfig};
use crate::persistence::KvStoreConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Prefix of every environment variable read by [`IntakeConfig::from_env`]
pub const ENV_PREFIX: &str = "INTAKE_";

/// Longest accepted audit retention, in days
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Errors raised while loading configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An environment variable holds a value of the wrong type
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Rejected value
        value: String,
    },
}

/// Settings for the transaction intake service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// NATS connection
    pub nats: NatsConfig,
    /// JetStream stream carrying transaction events
    pub transactions_stream: String,
    /// Subject transaction events are published on
    pub transactions_subject: String,
    /// Durable consumer name shared by intake workers
    pub consumer_name: String,
    /// Subject dead-lettered events are published on
    pub dead_letter_subject: String,
    /// JetStream stream retaining dead-lettered events
    pub dead_letter_stream: String,
    /// Key-value bucket holding admitted transactions
    pub transactions_bucket: String,
    /// Key-value bucket holding the idempotency audit table
    pub processed_events_bucket: String,
    /// Age after which audit rows are purged
    pub processed_event_retention_days: u32,
    /// Seconds between housekeeping runs
    pub housekeeping_interval_secs: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            transactions_stream: "TRANSACTIONS".to_string(),
            transactions_subject: "transactions.events".to_string(),
            consumer_name: "transaction-intake".to_string(),
            dead_letter_subject: "transactions.events.dlq".to_string(),
            dead_letter_stream: "TRANSACTIONS_DLQ".to_string(),
            transactions_bucket: "transactions".to_string(),
            processed_events_bucket: "processed-events".to_string(),
            processed_event_retention_days: 30,
            housekeeping_interval_secs: 3600,
        }
    }
}

impl IntakeConfig {
    /// Defaults overlaid with `INTAKE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by variable name
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(url) = var("NATS_URL") {
            config.nats.url = url;
        }
        config.nats.user = var("NATS_USER").or(config.nats.user);
        config.nats.password = var("NATS_PASSWORD").or(config.nats.password);
        if let Some(tls) = var("NATS_TLS") {
            config.nats.tls_required = parse("NATS_TLS", &tls)?;
        }
        if let Some(stream) = var("STREAM") {
            config.transactions_stream = stream;
        }
        if let Some(subject) = var("SUBJECT") {
            config.transactions_subject = subject;
        }
        if let Some(consumer) = var("CONSUMER") {
            config.consumer_name = consumer;
        }
        if let Some(subject) = var("DLQ_SUBJECT") {
            config.dead_letter_subject = subject;
        }
        if let Some(stream) = var("DLQ_STREAM") {
            config.dead_letter_stream = stream;
        }
        if let Some(bucket) = var("TRANSACTIONS_BUCKET") {
            config.transactions_bucket = bucket;
        }
        if let Some(bucket) = var("PROCESSED_EVENTS_BUCKET") {
            config.processed_events_bucket = bucket;
        }
        if let Some(days) = var("RETENTION_DAYS") {
            config.processed_event_retention_days = parse("RETENTION_DAYS", &days)?;
        }
        if let Some(secs) = var("HOUSEKEEPING_INTERVAL_SECS") {
            config.housekeeping_interval_secs = parse("HOUSEKEEPING_INTERVAL_SECS", &secs)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the housekeeping loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processed_event_retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}RETENTION_DAYS"),
                value: self.processed_event_retention_days.to_string(),
            });
        }
        if self.housekeeping_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}HOUSEKEEPING_INTERVAL_SECS"),
                value: self.housekeeping_interval_secs.to_string(),
            });
        }
        Ok(())
    }

    /// Consumer settings for [`crate::infrastructure::TransactionEventConsumer`]
    pub fn consumer(&self) -> EventConsumerConfig {
        EventConsumerConfig {
            stream_name: self.transactions_stream.clone(),
            subject: self.transactions_subject.clone(),
            durable_name: self.consumer_name.clone(),
        }
    }

    /// Bucket settings for the transaction store
    pub fn transactions_kv(&self) -> KvStoreConfig {
        KvStoreConfig::transactions(self.transactions_bucket.clone())
    }

    /// Bucket settings for the processed-event store
    pub fn processed_events_kv(&self) -> KvStoreConfig {
        KvStoreConfig::processed_events(self.processed_events_bucket.clone())
    }

    /// How long audit rows are kept
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.processed_event_retention_days))
    }

    /// Time between housekeeping runs
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IntakeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, IntakeConfig::default());
        assert_eq!(config.dead_letter_subject, "transactions.events.dlq");
        assert_eq!(config.retention(), chrono::Duration::days(30));
        assert_eq!(config.consumer().durable_name, "transaction-intake");
    }

    #[test]
    fn test_overlay() {
        let config = IntakeConfig::from_lookup(lookup(&[
            ("INTAKE_NATS_URL", "nats://broker:4222"),
            ("INTAKE_DLQ_SUBJECT", "tx.dlq"),
            ("INTAKE_RETENTION_DAYS", "7"),
            ("INTAKE_NATS_TLS", "true"),
        ]))
        .unwrap();
        assert_eq!(config.nats.url, "nats://broker:4222");
        assert!(config.nats.tls_required);
        assert_eq!(config.dead_letter_subject, "tx.dlq");
        assert_eq!(config.processed_event_retention_days, 7);
    }

    #[test]
    fn test_unparsable_number_is_an_error() {
        let err = IntakeConfig::from_lookup(lookup(&[("INTAKE_RETENTION_DAYS", "a month")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "INTAKE_RETENTION_DAYS".to_string(),
                value: "a month".to_string(),
            }
        );
    }

    #[test]
    fn test_zero_housekeeping_interval_is_rejected() {
        let err = IntakeConfig::from_lookup(lookup(&[("INTAKE_HOUSEKEEPING_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "INTAKE_HOUSEKEEPING_INTERVAL_SECS".to_string(),
                value: "0".to_string(),
            }
        );
    }

    #[test]
    fn test_retention_beyond_limit_is_rejected() {
        let err = IntakeConfig::from_lookup(lookup(&[("INTAKE_RETENTION_DAYS", "4000000000")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "INTAKE_RETENTION_DAYS"
        ));

        let longest = IntakeConfig::from_lookup(lookup(&[("INTAKE_RETENTION_DAYS", "36500")]))
            .unwrap();
        assert!(Utc::now().checked_sub_signed(longest.retention()).is_some());
    }

    #[test]
    fn test_validate_checks_deserialized_settings() {
        let config: IntakeConfig =
            serde_json::from_str(r#"{"housekeeping_interval_secs": 0}"#).unwrap();
        assert!(config.validate().is_err());
        assert!(IntakeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_deserializes_partial_document() {
        let config: IntakeConfig = serde_json::from_str(
            r#"{"consumer_name": "worker-2", "nats": {"url": "nats://a:4222"}}"#,
        )
        .unwrap();
        assert_eq!(config.consumer_name, "worker-2");
        assert_eq!(config.transactions_stream, "TRANSACTIONS");
        assert_eq!(config.nats.url, "nats://a:4222");
        assert_eq!(config.nats.connection_timeout_secs, 10);
    }
}
