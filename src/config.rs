//! Requester configuration (`[mqtt]` and `[request]` sections).

use std::path::Path;
use std::time::Duration;

use rpc_transport::config::{self, validate_timeout, ConfigError, MqttConfig};
use serde::{Deserialize, Serialize};

use crate::requester::{RequesterOptions, DEFAULT_CLIENT_ID};

/// Call settings (`[request]` section).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RequestSettings {
    /// Bound on waiting for each reply.
    pub timeout_seconds: u64,
    /// Bound on waiting for the response subscription.
    pub connect_timeout_seconds: u64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
        }
    }
}

/// Everything the requester reads from the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RequesterConfig {
    pub mqtt: MqttConfig,
    pub request: RequestSettings,
}

impl RequesterConfig {
    /// Resolve, load and validate the configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let source = config::resolve_config_path(explicit)?;
        let config: Self = config::load(&source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mqtt.validate()?;
        validate_timeout("request.timeout_seconds", self.request.timeout_seconds)?;
        validate_timeout(
            "request.connect_timeout_seconds",
            self.request.connect_timeout_seconds,
        )
    }

    /// Requester options, with the call timeout optionally overridden.
    pub fn options(&self, timeout_override: Option<u64>) -> Result<RequesterOptions, ConfigError> {
        let timeout_seconds = timeout_override.unwrap_or(self.request.timeout_seconds);
        validate_timeout("timeout", timeout_seconds)?;
        Ok(RequesterOptions {
            client_id: self.mqtt.client_id_or(DEFAULT_CLIENT_ID),
            connect_timeout: Duration::from_secs(self.request.connect_timeout_seconds),
            call_timeout: Duration::from_secs(timeout_seconds),
        })
    }
}
