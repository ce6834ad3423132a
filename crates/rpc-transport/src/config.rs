//! Configuration file loading and the broker connection settings.
//!
//! All binaries read one TOML file. Each binary deserializes only the
//! sections it needs; unknown sections and keys are ignored.
//!
//! Path resolution, first match wins:
//! 1. an explicit path (e.g. `--config`)
//! 2. the `PUBSUB_RPC_CONFIG` environment variable
//! 3. `~/.config/pubsub-rpc/config.toml`
//!
//! An explicitly named file must exist. A missing default file means
//! "use built-in defaults".

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PUBSUB_RPC_CONFIG";

/// Location of the default configuration file, relative to `$HOME`.
pub const DEFAULT_CONFIG_PATH: &str = ".config/pubsub-rpc/config.toml";

/// Configuration errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("HOME environment variable not set")]
    NoHome,

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Environment(PathBuf),
    Default(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Explicit(p) | Self::Environment(p) | Self::Default(p) => p,
        }
    }

    fn must_exist(&self) -> bool {
        !matches!(self, Self::Default(_))
    }
}

/// Resolve the configuration file location.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<ConfigSource, ConfigError> {
    if let Some(path) = explicit {
        return Ok(ConfigSource::Explicit(path.to_path_buf()));
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(ConfigSource::Environment(PathBuf::from(path)));
    }
    let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
    Ok(ConfigSource::Default(PathBuf::from(home).join(DEFAULT_CONFIG_PATH)))
}

/// Load a configuration type from the resolved file.
///
/// A missing default file yields `T::default()`.
pub fn load<T: DeserializeOwned + Default>(source: &ConfigSource) -> Result<T, ConfigError> {
    let path = source.path();
    if !path.exists() {
        if source.must_exist() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse(&content)?;
    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Parse a configuration type from TOML text.
pub fn parse<T: DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Check a timeout value lies in (0, 3600] seconds.
pub fn validate_timeout(field: &str, seconds: u64) -> Result<(), ConfigError> {
    if seconds == 0 || seconds > 3600 {
        return Err(ConfigError::invalid(
            field,
            format!("must be in (0, 3600], got {}", seconds),
        ));
    }
    Ok(())
}

/// Broker connection settings (`[mqtt]` section).
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Client identity; binaries fall back to their own name.
    pub client_id: Option<String>,
    /// Bound on the connect handshake.
    pub connect_timeout_seconds: u64,
    /// Delay between connection attempts on long-running services.
    pub connect_retry_delay_seconds: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: None,
            connect_timeout_seconds: 5,
            connect_retry_delay_seconds: 2,
        }
    }
}

impl MqttConfig {
    /// Server URL, for logging.
    pub fn server(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }

    /// `host:port` socket address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Client id from config, or `fallback`.
    pub fn client_id_or(&self, fallback: &str) -> String {
        self.client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::invalid("mqtt.host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("mqtt.port", "must be non-zero"));
        }
        validate_timeout("mqtt.connect_timeout_seconds", self.connect_timeout_seconds)?;
        validate_timeout(
            "mqtt.connect_retry_delay_seconds",
            self.connect_retry_delay_seconds,
        )
    }
}

impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("connect_retry_delay_seconds", &self.connect_retry_delay_seconds)
            .finish()
    }
}
