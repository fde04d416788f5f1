use repokit_core::config::DriverProfile;
use repokit_core::{
    ConnectionConfig, ConnectionManager, Connector, Database, DriverFailure, ErrorKind,
    RetryPolicy, SqliteConnector, StatementKind,
};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fails with `message` for the first `failures` attempts, then connects.
struct FlakyConnector {
    failures: u32,
    message: &'static str,
    attempts: Arc<AtomicU32>,
}

impl Connector for FlakyConnector {
    fn connect(
        &self,
        profile: &DriverProfile,
        config: &ConnectionConfig,
    ) -> Result<Connection, DriverFailure> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(DriverFailure::new(self.message));
        }
        SqliteConnector.connect(profile, config)
    }
}

/// Opens SQLite handles whose liveness is controlled by `alive`.
struct FragileConnector {
    alive: Arc<AtomicBool>,
    connects: Arc<AtomicU32>,
}

impl Connector for FragileConnector {
    fn connect(
        &self,
        profile: &DriverProfile,
        config: &ConnectionConfig,
    ) -> Result<Connection, DriverFailure> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
        SqliteConnector.connect(profile, config)
    }

    fn is_alive(&self, conn: &Connection, profile: &DriverProfile) -> bool {
        self.alive.load(Ordering::SeqCst) && SqliteConnector.is_alive(conn, profile)
    }
}

fn fragile_db() -> (Database, Arc<AtomicBool>, Arc<AtomicU32>) {
    let alive = Arc::new(AtomicBool::new(true));
    let connects = Arc::new(AtomicU32::new(0));
    let connector = FragileConnector {
        alive: Arc::clone(&alive),
        connects: Arc::clone(&connects),
    };
    let manager =
        ConnectionManager::with_connector(ConnectionConfig::sqlite_in_memory(), connector)
            .unwrap()
            .with_retry_policy(fast_retry(3));
    (Database::new(manager), alive, connects)
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_cap: 5,
        backoff_unit: Duration::ZERO,
    }
}

fn flaky_manager(failures: u32, message: &'static str) -> (ConnectionManager, Arc<AtomicU32>) {
    let attempts = Arc::new(AtomicU32::new(0));
    let connector = FlakyConnector {
        failures,
        message,
        attempts: Arc::clone(&attempts),
    };
    let manager = ConnectionManager::with_connector(ConnectionConfig::sqlite_in_memory(), connector)
        .unwrap()
        .with_retry_policy(fast_retry(3));
    (manager, attempts)
}

#[test]
fn transient_failures_are_retried_until_success() {
    let (mut manager, attempts) = flaky_manager(2, "connection refused by peer");

    manager.get_connection(false).unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    let report = manager.last_connect_report().unwrap();
    assert_eq!(report.attempts, 3);
    assert_eq!(report.slept, Duration::ZERO);
    assert!(manager.is_alive());
}

#[test]
fn exhausted_retries_surface_connection_failed_with_attempts() {
    let (mut manager, attempts) = flaky_manager(10, "server has gone away");

    let err = manager.get_connection(false).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert_eq!(err.code(), 503);
    assert_eq!(err.context_value("attempts"), Some("3"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn configuration_failures_are_not_retried() {
    let (mut manager, attempts) = flaky_manager(10, "Access denied for user 'app'@'10.0.0.1'");

    let err = manager.get_connection(false).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(manager.last_connect_report().is_none());
}

#[test]
fn backoff_sleep_is_accumulated_in_report() {
    let attempts = Arc::new(AtomicU32::new(0));
    let connector = FlakyConnector {
        failures: 2,
        message: "connection timed out",
        attempts: Arc::clone(&attempts),
    };
    let mut manager =
        ConnectionManager::with_connector(ConnectionConfig::sqlite_in_memory(), connector)
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 5,
                backoff_cap: 1,
                backoff_unit: Duration::from_millis(5),
            });

    manager.get_connection(false).unwrap();

    let report = manager.last_connect_report().unwrap();
    assert_eq!(report.slept, Duration::from_millis(10));
    assert!(report.latency >= report.slept);
}

#[test]
fn existing_live_handle_is_reused_and_force_reconnects() {
    let (mut manager, attempts) = flaky_manager(0, "unused");

    manager.get_connection(false).unwrap();
    let first_id = manager.last_connect_report().unwrap().connection_id;
    manager.get_connection(false).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    manager.get_connection(true).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_ne!(manager.last_connect_report().unwrap().connection_id, first_id);

    manager.disconnect();
    assert!(!manager.is_alive());
    assert!(manager.current().is_none());
}

#[test]
fn unknown_driver_fails_validation() {
    let config = ConnectionConfig::from_json_str(r#"{"driver": "mongodb"}"#).unwrap();
    let err = Database::connect(config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}

#[test]
fn driver_without_linked_backend_reports_configuration_error() {
    let config = ConnectionConfig::from_json_str(
        r#"{
            "driver": "pgsql",
            "host": "db.internal",
            "database": "app",
            "username": "svc",
            "password": "hunter2"
        }"#,
    )
    .unwrap();

    let err = Database::connect(config).err().unwrap();

    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert_eq!(err.context_value("attempts"), Some("1"));
    assert_eq!(err.context_value("password"), Some("******"));
    assert!(!err.to_string().contains("hunter2"));
}

#[test]
fn file_database_connects_with_session_init_and_reconnects() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let mut config = ConnectionConfig::sqlite(&path);
    config.init_commands = vec!["PRAGMA journal_mode = WAL".to_string()];

    let db = Database::connect(config).unwrap();
    db.execute_batch("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT);")
        .unwrap();
    db.reconnect().unwrap();

    let rows = db
        .execute(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = :name",
            &[(":name".to_string(), "kv".into())],
            StatementKind::Select,
        )
        .unwrap();
    assert_eq!(rows.rows.len(), 1);

    let foreign_keys = db
        .execute("PRAGMA foreign_keys", &[], StatementKind::Select)
        .unwrap();
    assert_eq!(foreign_keys.first().unwrap().get_i64("foreign_keys"), Some(1));
    assert!(db.ping());
    assert!(db.interrupt_handle().is_some());
}

#[test]
fn dead_handle_is_replaced_on_next_statement() {
    let (db, alive, connects) = fragile_db();
    db.execute("SELECT 1 AS one", &[], StatementKind::Select)
        .unwrap();
    let first_id = db.last_connect_report().unwrap().connection_id;
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    alive.store(false, Ordering::SeqCst);
    assert!(!db.ping());

    let rows = db
        .execute("SELECT 1 AS one", &[], StatementKind::Select)
        .unwrap();
    assert_eq!(rows.first().unwrap().get_i64("one"), Some(1));
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    let report = db.last_connect_report().unwrap();
    assert_eq!(report.attempts, 1);
    assert_ne!(report.connection_id, first_id);
    assert!(db.ping());
}

#[test]
fn dead_handle_inside_transaction_is_not_replaced() {
    let (db, alive, connects) = fragile_db();
    db.begin_transaction().unwrap();

    alive.store(false, Ordering::SeqCst);
    let err = db
        .execute("SELECT 1 AS one", &[], StatementKind::Select)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert_eq!(err.context_value("transaction_level"), Some("1"));
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    db.rollback().unwrap();
    assert_eq!(db.transaction_level(), 0);
    db.execute("SELECT 1 AS one", &[], StatementKind::Select)
        .unwrap();
    assert_eq!(connects.load(Ordering::SeqCst), 2);
}
