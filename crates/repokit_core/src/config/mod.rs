//! Connection configuration loading and validation.
//!
//! # Responsibility
//! - Deserialize `ConnectionConfig` from JSON produced by the host
//!   application's config loader.
//! - Validate driver-required fields before any connection attempt.
//! - Produce masked context for logs and errors.
//!
//! # Invariants
//! - A config is immutable once loaded; the manager only reads it.
//! - Validation failures are `ConfigurationError` and are never retried.
//! - Password text never appears in `Debug` output or masked context.

use crate::error::{DatabaseError, DbResult};
use crate::sanitize::MASK;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::time::Duration;

mod driver;

pub use driver::{
    driver_profile, supported_drivers, DriverProfile, GeneratedKeys, LimitStyle, RequiredField,
};

const DEFAULT_TIMEOUT_SECS: u64 = 5;

static SESSION_IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid session identifier regex"));

/// Database connection settings.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Driver identifier or alias, e.g. `mysql`, `pgsql`, `sqlite`.
    pub driver: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Database name, or file path for SQLite (`:memory:` allowed).
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
    /// Connect/busy timeout in seconds.
    pub timeout: Option<u64>,
    /// Oracle-style service name.
    pub service_name: Option<String>,
    /// Extra statements run after connect, best effort.
    pub init_commands: Vec<String>,
    /// Driver-specific extras passed through untouched.
    pub options: BTreeMap<String, serde_json::Value>,
}

impl ConnectionConfig {
    /// Config for a SQLite database file.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            driver: "sqlite".to_string(),
            database: Some(path.as_ref().to_string_lossy().into_owned()),
            ..Self::default()
        }
    }

    /// Config for a private in-memory SQLite database.
    pub fn sqlite_in_memory() -> Self {
        Self {
            driver: "sqlite".to_string(),
            database: Some(":memory:".to_string()),
            ..Self::default()
        }
    }

    /// Parses a config from JSON text.
    pub fn from_json_str(json: &str) -> DbResult<Self> {
        serde_json::from_str(json).map_err(|err| {
            DatabaseError::configuration(format!("invalid connection config JSON: {err}"))
        })
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            DatabaseError::configuration(format!(
                "failed to read connection config `{}`: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// Validates the config and returns the matching driver profile.
    ///
    /// # Errors
    /// - Unknown driver identifier.
    /// - Missing or blank driver-required field.
    /// - Charset/collation that is not a plain identifier.
    /// - Zero port or zero timeout.
    pub fn validate(&self) -> DbResult<&'static DriverProfile> {
        let profile = driver_profile(&self.driver).ok_or_else(|| {
            DatabaseError::configuration(format!(
                "unknown database driver `{}`; expected one of {}",
                self.driver,
                supported_drivers().join("|")
            ))
            .with_context_map(self.masked_context())
        })?;

        let missing = profile
            .required
            .iter()
            .copied()
            .filter(|field| !self.has_field(*field))
            .map(RequiredField::as_str)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(DatabaseError::configuration(format!(
                "driver `{}` requires missing config field(s): {}",
                profile.name,
                missing.join(", ")
            ))
            .with_context_map(self.masked_context()));
        }

        for (field, value) in [("charset", &self.charset), ("collation", &self.collation)] {
            if let Some(value) = value {
                if !SESSION_IDENT_RE.is_match(value) {
                    return Err(DatabaseError::configuration(format!(
                        "config field `{field}` must match [A-Za-z0-9_]+, got `{value}`"
                    )));
                }
            }
        }

        if self.port == Some(0) {
            return Err(DatabaseError::configuration("config field `port` must be non-zero"));
        }
        if self.timeout == Some(0) {
            return Err(DatabaseError::configuration(
                "config field `timeout` must be at least 1 second",
            ));
        }

        Ok(profile)
    }

    /// Connect/busy timeout, defaulting to 5 seconds.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Returns a driver-specific extra as text.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(serde_json::Value::as_str)
    }

    /// Context entries safe for logs and error payloads.
    pub fn masked_context(&self) -> Vec<(String, String)> {
        let mut context = vec![("driver".to_string(), self.driver.clone())];
        let fields = [
            ("host", self.host.clone()),
            ("port", self.port.map(|port| port.to_string())),
            ("database", self.database.clone()),
            ("username", self.username.clone()),
        ];
        context.extend(
            fields
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key.to_string(), value))),
        );
        if self.password.is_some() {
            context.push(("password".to_string(), MASK.to_string()));
        }
        context
    }

    fn has_field(&self, field: RequiredField) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        match field {
            RequiredField::Host => present(&self.host),
            RequiredField::Database => present(&self.database),
            RequiredField::Username => present(&self.username),
            RequiredField::ServiceOrDatabase => {
                present(&self.service_name) || present(&self.database)
            }
        }
    }
}

impl Debug for ConnectionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| MASK))
            .field("charset", &self.charset)
            .field("collation", &self.collation)
            .field("timeout", &self.timeout)
            .field("service_name", &self.service_name)
            .field("init_commands", &self.init_commands)
            .field("options", &self.options.keys().collect::<Vec<_>>())
            .finish()
    }
}
