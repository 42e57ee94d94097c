// Copyright 2025 Cowboy AI, LLC.

//! NATS connection shared by the consumer, the dead-letter sink and the
//! key-value stores

use async_nats::jetstream::{self, Context as JetStreamContext};
use async_nats::{Client, ConnectOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that can occur when working with NATS
#[derive(Debug, Error)]
pub enum NatsError {
    /// Failed to establish connection to NATS server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Error occurred in JetStream operations
    #[error("JetStream error: {0}")]
    JetStreamError(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<async_nats::Error> for NatsError {
    fn from(err: async_nats::Error) -> Self {
        NatsError::ConnectionFailed(err.to_string())
    }
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Server URL, e.g. `nats://localhost:4222`
    pub url: String,

    /// Username for authentication
    pub user: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Whether TLS is required
    pub tls_required: bool,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Delay between reconnect attempts in seconds
    pub reconnect_interval_secs: u64,

    /// Maximum reconnect attempts (0 = infinite)
    pub max_reconnects: usize,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            user: None,
            password: None,
            tls_required: false,
            connection_timeout_secs: 10,
            reconnect_interval_secs: 5,
            max_reconnects: 0,
        }
    }
}

impl NatsConfig {
    /// Check the settings before connecting
    pub fn validate(&self) -> Result<(), NatsError> {
        if self.url.trim().is_empty() {
            return Err(NatsError::ConfigurationError("NATS url is empty".to_string()));
        }
        if self.user.is_some() != self.password.is_some() {
            return Err(NatsError::ConfigurationError(
                "NATS user and password must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Reconnect cap for the client; `None` retries forever
    pub fn reconnect_limit(&self) -> Option<usize> {
        match self.max_reconnects {
            0 => None,
            limit => Some(limit),
        }
    }
}

/// NATS client with its JetStream context
#[derive(Debug, Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: JetStreamContext,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect with the given settings
    pub async fn connect(config: NatsConfig) -> Result<Self, NatsError> {
        config.validate()?;

        let reconnect_interval = Duration::from_secs(config.reconnect_interval_secs);
        let mut options = ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .max_reconnects(config.reconnect_limit())
            .reconnect_delay_callback(move |_attempts| reconnect_interval)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => warn!("NATS disconnected"),
                    async_nats::Event::Connected => info!("NATS connected"),
                    async_nats::Event::ClientError(err) => {
                        error!(error = %err, "NATS client error")
                    }
                    _ => {}
                }
            });

        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            options = options.user_and_password(user.clone(), password.clone());
        }
        if config.tls_required {
            options = options.require_tls(true);
        }

        let client = options.connect(&config.url).await.map_err(|e| {
            NatsError::ConnectionFailed(format!("Failed to connect to {}: {e}", config.url))
        })?;
        let jetstream = jetstream::new(client.clone());
        info!(url = %config.url, "Connected to NATS");

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// The underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The JetStream context
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    /// The settings used to connect
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Whether the server answers a flush
    pub async fn is_connected(&self) -> bool {
        self.client.flush().await.is_ok()
    }
}
