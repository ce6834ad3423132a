//! Responder configuration (`[mqtt]` and `[db]` sections).

use std::fmt;
use std::path::Path;

use rpc_transport::config::{self, ConfigError, MqttConfig};
use serde::{Deserialize, Serialize};

/// Database backend selected by `db.driver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbDriver {
    /// No database connection is opened.
    None,
    /// SQLite file at `db.database`; an empty path opens an in-memory database.
    Sqlite,
}

impl DbDriver {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "" | "none" => Ok(Self::None),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::invalid(
                "db.driver",
                format!("unsupported driver '{}'", other),
            )),
        }
    }
}

/// Database settings (`[db]` section).
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DbConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            driver: "none".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl DbConfig {
    pub fn driver(&self) -> Result<DbDriver, ConfigError> {
        DbDriver::parse(&self.driver)
    }

    /// Settings present in the file that `driver` has no use for.
    ///
    /// `host`, `port`, `username` and `password` only apply to network
    /// databases; neither supported driver reads them.
    pub fn ignored_fields(&self, driver: DbDriver) -> Vec<&'static str> {
        let defaults = Self::default();
        let mut ignored = Vec::new();
        if driver == DbDriver::None && !self.database.is_empty() {
            ignored.push("database");
        }
        if self.host != defaults.host {
            ignored.push("host");
        }
        if self.port != defaults.port {
            ignored.push("port");
        }
        if !self.username.is_empty() {
            ignored.push("username");
        }
        if !self.password.is_empty() {
            ignored.push("password");
        }
        ignored
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything the responder reads from the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResponderConfig {
    pub mqtt: MqttConfig,
    pub db: DbConfig,
}

impl ResponderConfig {
    /// Resolve, load and validate the configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let source = config::resolve_config_path(explicit)?;
        let config: Self = config::load(&source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mqtt.validate()?;
        self.db.driver()?;
        Ok(())
    }
}
