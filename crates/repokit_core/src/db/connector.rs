//! Driver connectors that turn a validated config into a live handle.
//!
//! # Responsibility
//! - Open the physical connection for one driver profile.
//! - Report raw driver failures for classification by the manager.
//! - Probe handle liveness with the driver's cheapest round trip.
//!
//! # Invariants
//! - Connectors do not retry; retry policy lives in `ConnectionManager`.
//! - Only SQLite is linked into this build; other profiles report a
//!   missing-driver failure, which classifies as a configuration error.

use crate::config::{ConnectionConfig, DriverProfile};
use crate::error::{classify_sqlite_error, DriverFailure};
use rusqlite::{Connection, OpenFlags};

const MEMORY_DATABASE: &str = ":memory:";

/// Opens physical connections for the manager.
pub trait Connector: Send {
    fn connect(
        &self,
        profile: &DriverProfile,
        config: &ConnectionConfig,
    ) -> Result<Connection, DriverFailure>;

    /// Liveness probe for a handle this connector opened.
    fn is_alive(&self, conn: &Connection, profile: &DriverProfile) -> bool {
        conn.query_row(profile.liveness_sql, [], |_| Ok(())).is_ok()
    }
}

/// Connector backed by bundled SQLite.
///
/// Recognized `options`: `mode` = `ro` opens read-only; `create` = `false`
/// refuses to create a missing database file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(
        &self,
        profile: &DriverProfile,
        config: &ConnectionConfig,
    ) -> Result<Connection, DriverFailure> {
        if profile.name != "sqlite" {
            return Err(DriverFailure::new(format!(
                "could not find driver `{}`: only sqlite is available in this build",
                profile.name
            )));
        }

        let path = config.database.as_deref().unwrap_or(MEMORY_DATABASE);
        let conn = if path == MEMORY_DATABASE {
            Connection::open_in_memory()
        } else {
            Connection::open_with_flags(path, open_flags(config))
        }
        .map_err(|err| classify_sqlite_error(&err).0)?;

        conn.busy_timeout(config.connect_timeout())
            .map_err(|err| classify_sqlite_error(&err).0)?;
        Ok(conn)
    }
}

fn open_flags(config: &ConnectionConfig) -> OpenFlags {
    let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if config.option_str("mode") == Some("ro") {
        flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        return flags;
    }

    flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
    let create = config
        .options
        .get("create")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true);
    if create {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::{Connector, SqliteConnector};
    use crate::config::{driver_profile, ConnectionConfig};
    use crate::error::ErrorKind;

    #[test]
    fn opens_in_memory_sqlite() {
        let config = ConnectionConfig::sqlite_in_memory();
        let profile = config.validate().unwrap();
        let conn = SqliteConnector.connect(profile, &config).unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn non_sqlite_driver_reports_missing_driver() {
        let config = ConnectionConfig {
            driver: "mysql".to_string(),
            ..ConnectionConfig::default()
        };
        let failure = SqliteConnector
            .connect(driver_profile("mysql").unwrap(), &config)
            .unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::ConfigurationError);
    }

    #[test]
    fn missing_file_without_create_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ConnectionConfig::sqlite(dir.path().join("absent.db"));
        config
            .options
            .insert("create".to_string(), serde_json::Value::Bool(false));
        let profile = config.validate().unwrap();

        let failure = SqliteConnector.connect(profile, &config).unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::ConfigurationError);
    }
}
