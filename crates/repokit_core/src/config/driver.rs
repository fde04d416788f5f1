//! Static per-driver profiles.
//!
//! # Responsibility
//! - Hold default port/charset, required fields and SQL dialect details for
//!   every supported driver identifier.
//! - Build driver-specific DSNs and session initialization statements.
//!
//! # Invariants
//! - The table is closed; unknown identifiers are configuration errors.
//! - DSN text never embeds the password.

use super::ConnectionConfig;

/// Configuration fields a driver may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Host,
    Database,
    Username,
    /// Either `service_name` or `database` must be present.
    ServiceOrDatabase,
}

impl RequiredField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Database => "database",
            Self::Username => "username",
            Self::ServiceOrDatabase => "service_name|database",
        }
    }
}

/// How generated primary keys are read back after INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKeys {
    /// `INSERT ... RETURNING <pk>` reports keys directly.
    Returning,
    /// Last insert id is the first id of a multi-row insert.
    LastInsertIdFirst,
}

/// Pagination clause flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

/// Per-driver defaults and dialect rules.
#[derive(Debug, Clone, Copy)]
pub struct DriverProfile {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub default_port: Option<u16>,
    pub default_charset: Option<&'static str>,
    pub required: &'static [RequiredField],
    pub quote_open: char,
    pub quote_close: char,
    pub begin_sql: &'static str,
    /// Cheapest round trip accepted by the server; used as liveness probe.
    pub liveness_sql: &'static str,
    pub limit_style: LimitStyle,
    /// `UPDATE/DELETE ... LIMIT n` is accepted directly; otherwise limited
    /// writes go through a primary-key subquery.
    pub trailing_write_limit: bool,
    pub generated_keys: GeneratedKeys,
    build_dsn: fn(&ConnectionConfig, &DriverProfile) -> String,
    session_sql: fn(&ConnectionConfig, &DriverProfile) -> Vec<String>,
}

const DRIVER_PROFILES: &[DriverProfile] = &[
    DriverProfile {
        name: "mysql",
        aliases: &["mariadb"],
        default_port: Some(3306),
        default_charset: Some("utf8mb4"),
        required: &[RequiredField::Host, RequiredField::Database, RequiredField::Username],
        quote_open: '`',
        quote_close: '`',
        begin_sql: "START TRANSACTION",
        liveness_sql: "SELECT 1",
        limit_style: LimitStyle::LimitOffset,
        trailing_write_limit: true,
        generated_keys: GeneratedKeys::LastInsertIdFirst,
        build_dsn: mysql_dsn,
        session_sql: mysql_session,
    },
    DriverProfile {
        name: "pgsql",
        aliases: &["postgres", "postgresql"],
        default_port: Some(5432),
        default_charset: Some("utf8"),
        required: &[RequiredField::Host, RequiredField::Database, RequiredField::Username],
        quote_open: '"',
        quote_close: '"',
        begin_sql: "BEGIN",
        liveness_sql: "SELECT 1",
        limit_style: LimitStyle::LimitOffset,
        trailing_write_limit: false,
        generated_keys: GeneratedKeys::Returning,
        build_dsn: pgsql_dsn,
        session_sql: pgsql_session,
    },
    DriverProfile {
        name: "sqlite",
        aliases: &["sqlite3"],
        default_port: None,
        default_charset: None,
        required: &[RequiredField::Database],
        quote_open: '"',
        quote_close: '"',
        begin_sql: "BEGIN",
        liveness_sql: "SELECT 1",
        limit_style: LimitStyle::LimitOffset,
        trailing_write_limit: false,
        generated_keys: GeneratedKeys::Returning,
        build_dsn: sqlite_dsn,
        session_sql: sqlite_session,
    },
    DriverProfile {
        name: "sqlsrv",
        aliases: &["mssql", "sqlserver"],
        default_port: Some(1433),
        default_charset: None,
        required: &[RequiredField::Host, RequiredField::Database],
        quote_open: '[',
        quote_close: ']',
        begin_sql: "BEGIN TRANSACTION",
        liveness_sql: "SELECT 1",
        limit_style: LimitStyle::OffsetFetch,
        trailing_write_limit: false,
        generated_keys: GeneratedKeys::LastInsertIdFirst,
        build_dsn: sqlsrv_dsn,
        session_sql: no_session,
    },
    DriverProfile {
        name: "oci",
        aliases: &["oracle"],
        default_port: Some(1521),
        default_charset: Some("AL32UTF8"),
        required: &[
            RequiredField::Host,
            RequiredField::ServiceOrDatabase,
            RequiredField::Username,
        ],
        quote_open: '"',
        quote_close: '"',
        begin_sql: "SET TRANSACTION READ WRITE",
        liveness_sql: "SELECT 1 FROM DUAL",
        limit_style: LimitStyle::OffsetFetch,
        trailing_write_limit: false,
        generated_keys: GeneratedKeys::LastInsertIdFirst,
        build_dsn: oci_dsn,
        session_sql: oci_session,
    },
];

/// Looks up a driver profile by identifier or alias (case-insensitive).
pub fn driver_profile(driver: &str) -> Option<&'static DriverProfile> {
    let normalized = driver.trim().to_ascii_lowercase();
    DRIVER_PROFILES.iter().find(|profile| {
        profile.name == normalized || profile.aliases.contains(&normalized.as_str())
    })
}

/// Returns every supported canonical driver identifier.
pub fn supported_drivers() -> Vec<&'static str> {
    DRIVER_PROFILES.iter().map(|profile| profile.name).collect()
}

impl DriverProfile {
    /// Builds the connection string for `config`.
    pub fn dsn(&self, config: &ConnectionConfig) -> String {
        (self.build_dsn)(config, self)
    }

    /// Statements run right after connect (charset, pragmas, init commands).
    pub fn session_statements(&self, config: &ConnectionConfig) -> Vec<String> {
        let mut statements = (self.session_sql)(config, self);
        statements.extend(
            config
                .init_commands
                .iter()
                .map(|command| command.trim())
                .filter(|command| !command.is_empty())
                .map(str::to_string),
        );
        statements
    }

    /// Quotes an identifier taken from an internal schema.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        format!("{}{identifier}{}", self.quote_open, self.quote_close)
    }

    pub fn port(&self, config: &ConnectionConfig) -> Option<u16> {
        config.port.or(self.default_port)
    }

    pub fn charset<'a>(&self, config: &'a ConnectionConfig) -> Option<&'a str> {
        config.charset.as_deref().or(self.default_charset)
    }
}

fn host(config: &ConnectionConfig) -> &str {
    config.host.as_deref().unwrap_or("localhost")
}

fn mysql_dsn(config: &ConnectionConfig, profile: &DriverProfile) -> String {
    let mut dsn = format!("mysql:host={}", host(config));
    if let Some(port) = profile.port(config) {
        dsn.push_str(&format!(";port={port}"));
    }
    dsn.push_str(&format!(";dbname={}", config.database.as_deref().unwrap_or_default()));
    if let Some(charset) = profile.charset(config) {
        dsn.push_str(&format!(";charset={charset}"));
    }
    dsn
}

fn mysql_session(config: &ConnectionConfig, profile: &DriverProfile) -> Vec<String> {
    let Some(charset) = profile.charset(config) else {
        return Vec::new();
    };
    match config.collation.as_deref() {
        Some(collation) => vec![format!("SET NAMES '{charset}' COLLATE '{collation}'")],
        None => vec![format!("SET NAMES '{charset}'")],
    }
}

fn pgsql_dsn(config: &ConnectionConfig, profile: &DriverProfile) -> String {
    let mut dsn = format!("pgsql:host={}", host(config));
    if let Some(port) = profile.port(config) {
        dsn.push_str(&format!(";port={port}"));
    }
    dsn.push_str(&format!(";dbname={}", config.database.as_deref().unwrap_or_default()));
    dsn
}

fn pgsql_session(config: &ConnectionConfig, profile: &DriverProfile) -> Vec<String> {
    profile
        .charset(config)
        .map(|charset| vec![format!("SET NAMES '{charset}'")])
        .unwrap_or_default()
}

fn sqlite_dsn(config: &ConnectionConfig, _profile: &DriverProfile) -> String {
    format!("sqlite:{}", config.database.as_deref().unwrap_or(":memory:"))
}

fn sqlite_session(_config: &ConnectionConfig, _profile: &DriverProfile) -> Vec<String> {
    vec!["PRAGMA foreign_keys = ON".to_string()]
}

fn sqlsrv_dsn(config: &ConnectionConfig, profile: &DriverProfile) -> String {
    let server = match profile.port(config) {
        Some(port) => format!("{},{port}", host(config)),
        None => host(config).to_string(),
    };
    format!(
        "sqlsrv:Server={server};Database={}",
        config.database.as_deref().unwrap_or_default()
    )
}

fn oci_dsn(config: &ConnectionConfig, profile: &DriverProfile) -> String {
    let service = config
        .service_name
        .as_deref()
        .or(config.database.as_deref())
        .unwrap_or_default();
    let mut dsn = match profile.port(config) {
        Some(port) => format!("oci:dbname=//{}:{port}/{service}", host(config)),
        None => format!("oci:dbname=//{}/{service}", host(config)),
    };
    if let Some(charset) = profile.charset(config) {
        dsn.push_str(&format!(";charset={charset}"));
    }
    dsn
}

fn oci_session(_config: &ConnectionConfig, _profile: &DriverProfile) -> Vec<String> {
    vec!["ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY-MM-DD HH24:MI:SS'".to_string()]
}

fn no_session(_config: &ConnectionConfig, _profile: &DriverProfile) -> Vec<String> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::{driver_profile, supported_drivers};
    use crate::config::ConnectionConfig;

    fn config(driver: &str) -> ConnectionConfig {
        ConnectionConfig {
            driver: driver.to_string(),
            host: Some("db.internal".to_string()),
            database: Some("risks".to_string()),
            username: Some("app".to_string()),
            password: Some("hunter2".to_string()),
            ..ConnectionConfig::default()
        }
    }

    #[test]
    fn aliases_resolve_to_canonical_profiles() {
        assert_eq!(driver_profile("Postgres").unwrap().name, "pgsql");
        assert_eq!(driver_profile("sqlite3").unwrap().name, "sqlite");
        assert_eq!(driver_profile("oracle").unwrap().name, "oci");
        assert!(driver_profile("mongodb").is_none());
        assert_eq!(supported_drivers().len(), 5);
    }

    #[test]
    fn dsn_uses_defaults_and_never_includes_password() {
        let mysql = config("mysql");
        let dsn = driver_profile("mysql").unwrap().dsn(&mysql);
        assert_eq!(dsn, "mysql:host=db.internal;port=3306;dbname=risks;charset=utf8mb4");

        let mut pg = config("pgsql");
        pg.port = Some(6543);
        let dsn = driver_profile("pgsql").unwrap().dsn(&pg);
        assert_eq!(dsn, "pgsql:host=db.internal;port=6543;dbname=risks");

        let mut oci = config("oci");
        oci.service_name = Some("ORCLPDB1".to_string());
        let dsn = driver_profile("oci").unwrap().dsn(&oci);
        assert_eq!(dsn, "oci:dbname=//db.internal:1521/ORCLPDB1;charset=AL32UTF8");

        for driver in supported_drivers() {
            let dsn = driver_profile(driver).unwrap().dsn(&config(driver));
            assert!(!dsn.contains("hunter2"), "{driver} leaked password");
        }
    }

    #[test]
    fn session_statements_include_charset_and_init_commands() {
        let mut mysql = config("mysql");
        mysql.collation = Some("utf8mb4_unicode_ci".to_string());
        mysql.init_commands = vec!["SET time_zone = '+00:00'".to_string(), "  ".to_string()];

        let statements = driver_profile("mysql").unwrap().session_statements(&mysql);
        assert_eq!(
            statements,
            vec![
                "SET NAMES 'utf8mb4' COLLATE 'utf8mb4_unicode_ci'".to_string(),
                "SET time_zone = '+00:00'".to_string(),
            ]
        );
    }

    #[test]
    fn identifiers_are_quoted_per_dialect() {
        assert_eq!(driver_profile("mysql").unwrap().quote_identifier("risks"), "`risks`");
        assert_eq!(driver_profile("sqlsrv").unwrap().quote_identifier("risks"), "[risks]");
        assert_eq!(driver_profile("sqlite").unwrap().quote_identifier("risks"), "\"risks\"");
    }

    #[test]
    fn oracle_liveness_probe_selects_from_dual() {
        assert_eq!(driver_profile("oci").unwrap().liveness_sql, "SELECT 1 FROM DUAL");
        assert_eq!(driver_profile("sqlite").unwrap().liveness_sql, "SELECT 1");
    }
}
