//! Database connection lifecycle.
//!
//! The responder opens the database once at startup and closes it once on
//! shutdown. Handlers do not use it yet.

use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::{DbConfig, DbDriver};
use rpc_transport::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// An open (or deliberately absent) database connection.
#[derive(Debug)]
pub struct Database {
    conn: Option<Connection>,
}

impl Database {
    pub fn connect(config: &DbConfig) -> Result<Self, DatabaseError> {
        let driver = config.driver()?;
        let ignored = config.ignored_fields(driver);
        if !ignored.is_empty() {
            warn!(driver = %config.driver, fields = ?ignored, "Ignoring db settings the driver does not use");
        }

        let conn = match driver {
            DbDriver::None => {
                info!("No database configured");
                None
            }
            DbDriver::Sqlite if config.database.is_empty() => {
                info!("Opening in-memory SQLite database");
                Some(Connection::open_in_memory()?)
            }
            DbDriver::Sqlite => {
                info!(path = %config.database, "Opening SQLite database");
                Some(Connection::open(&config.database)?)
            }
        };

        if let Some(conn) = &conn {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        }
        Ok(Self { conn })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn close(self) -> Result<(), DatabaseError> {
        let Some(conn) = self.conn else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| {
            warn!(error = %e, "Failed to close database");
            DatabaseError::Sqlite(e)
        })?;
        info!("Database closed");
        Ok(())
    }
}
