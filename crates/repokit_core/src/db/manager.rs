//! Resilient single-handle connection manager.
//!
//! # Responsibility
//! - Own the one live handle for a `Database`.
//! - Validate config, connect through a `Connector`, run session statements.
//! - Retry transient connect failures with bounded linear backoff.
//!
//! # Invariants
//! - Configuration-class failures consume zero retries.
//! - Sleep before retry `n` is `min(n, backoff_cap) * backoff_unit`.
//! - Logs carry driver/host/database only; never the password.

use super::connector::{Connector, SqliteConnector};
use crate::config::{ConnectionConfig, DriverProfile};
use crate::error::{DatabaseError, DbResult, ErrorKind};
use crate::sanitize::sanitize_text;
use log::{error, info, warn};
use rusqlite::{Connection, InterruptHandle};
use serde::Serialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Bounded retry settings for connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connect attempts, including the first one.
    pub max_attempts: u32,
    /// Upper bound, in units, for one backoff sleep.
    pub backoff_cap: u32,
    /// Length of one backoff unit.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_cap: 5,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Sleep applied after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt.min(self.backoff_cap)
    }
}

/// Outcome metadata of the last successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectReport {
    pub connection_id: Uuid,
    pub attempts: u32,
    pub latency: Duration,
    pub slept: Duration,
}

/// Owns and (re)creates the live database handle.
pub struct ConnectionManager {
    config: ConnectionConfig,
    profile: &'static DriverProfile,
    connector: Box<dyn Connector>,
    retry: RetryPolicy,
    handle: Option<Connection>,
    last_report: Option<ConnectReport>,
}

impl ConnectionManager {
    /// Creates a manager using the built-in SQLite connector.
    ///
    /// # Errors
    /// - `ConfigurationError` when `config` fails validation.
    pub fn new(config: ConnectionConfig) -> DbResult<Self> {
        Self::with_connector(config, SqliteConnector)
    }

    /// Creates a manager with a caller-supplied connector.
    pub fn with_connector(
        config: ConnectionConfig,
        connector: impl Connector + 'static,
    ) -> DbResult<Self> {
        let profile = config.validate()?;
        Ok(Self {
            config,
            profile,
            connector: Box::new(connector),
            retry: RetryPolicy::default(),
            handle: None,
            last_report: None,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn profile(&self) -> &'static DriverProfile {
        self.profile
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn last_connect_report(&self) -> Option<ConnectReport> {
        self.last_report
    }

    /// Returns a live handle, connecting or reconnecting when needed.
    ///
    /// A new handle is built on first use, when `force_reconnect` is set, or
    /// when the liveness probe fails on the current handle.
    pub fn get_connection(&mut self, force_reconnect: bool) -> DbResult<&Connection> {
        let needs_new = force_reconnect
            || match self.handle.as_ref() {
                None => true,
                Some(conn) => !self.connector.is_alive(conn, self.profile),
            };

        if needs_new {
            if self.handle.is_some() && !force_reconnect {
                warn!(
                    "event=db_liveness module=db status=dead driver={} action=reconnect",
                    self.profile.name
                );
            }
            self.handle = None;
            let conn = self.create_connection()?;
            self.handle = Some(conn);
        }

        self.handle
            .as_ref()
            .ok_or_else(|| DatabaseError::connection_failed("connection handle unavailable"))
    }

    /// Current handle without probing or reconnecting.
    pub fn current(&self) -> Option<&Connection> {
        self.handle.as_ref()
    }

    /// Liveness probe: the driver's trivial round trip on the current handle.
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|conn| self.connector.is_alive(conn, self.profile))
    }

    /// Handle for interrupting a running statement from another thread.
    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.handle.as_ref().map(Connection::get_interrupt_handle)
    }

    /// Drops the current handle, if any.
    pub fn disconnect(&mut self) {
        if self.handle.take().is_some() {
            info!(
                "event=db_disconnect module=db status=ok driver={}",
                self.profile.name
            );
        }
    }

    fn create_connection(&mut self) -> DbResult<Connection> {
        let profile = self.config.validate()?;
        let dsn = profile.dsn(&self.config);
        let session = profile.session_statements(&self.config);
        let started_at = Instant::now();
        let mut slept = Duration::ZERO;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.connector.connect(profile, &self.config) {
                Ok(conn) => {
                    run_session_statements(&conn, profile, &session);
                    let report = ConnectReport {
                        connection_id: Uuid::new_v4(),
                        attempts: attempt,
                        latency: started_at.elapsed(),
                        slept,
                    };
                    info!(
                        "event=db_connect module=db status=ok driver={} host={} database={} dsn={} attempts={} duration_ms={} conn_id={}",
                        profile.name,
                        self.host_for_log(),
                        self.database_for_log(),
                        dsn,
                        attempt,
                        report.latency.as_millis(),
                        report.connection_id
                    );
                    self.last_report = Some(report);
                    return Ok(conn);
                }
                Err(failure) => {
                    let kind = failure.kind();
                    let message = sanitize_text(&failure.message);

                    if !kind.is_transient() {
                        error!(
                            "event=db_connect module=db status=error driver={} host={} database={} attempt={} error_kind={} retry=false error={}",
                            profile.name,
                            self.host_for_log(),
                            self.database_for_log(),
                            attempt,
                            kind,
                            message
                        );
                        return Err(DatabaseError::new(
                            kind,
                            format!("connection to {} failed: {message}", profile.name),
                        )
                        .with_context("attempts", attempt.to_string())
                        .with_context("driver_message", message)
                        .with_context("driver_code", failure.code.unwrap_or_default())
                        .with_context_map(self.config.masked_context()));
                    }

                    if attempt >= self.retry.max_attempts {
                        error!(
                            "event=db_connect module=db status=error driver={} host={} database={} attempt={} error_kind={} retry=exhausted duration_ms={} error={}",
                            profile.name,
                            self.host_for_log(),
                            self.database_for_log(),
                            attempt,
                            kind,
                            started_at.elapsed().as_millis(),
                            message
                        );
                        return Err(DatabaseError::new(
                            ErrorKind::ConnectionFailed,
                            format!(
                                "connection to {} failed after {attempt} attempt(s): {message}",
                                profile.name
                            ),
                        )
                        .with_context("attempts", attempt.to_string())
                        .with_context("driver_message", message)
                        .with_context("driver_code", failure.code.unwrap_or_default())
                        .with_context_map(self.config.masked_context()));
                    }

                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "event=db_connect module=db status=retry driver={} host={} database={} attempt={} max_attempts={} backoff_ms={} error={}",
                        profile.name,
                        self.host_for_log(),
                        self.database_for_log(),
                        attempt,
                        self.retry.max_attempts,
                        delay.as_millis(),
                        message
                    );
                    std::thread::sleep(delay);
                    slept += delay;
                }
            }
        }
    }

    fn host_for_log(&self) -> &str {
        self.config.host.as_deref().unwrap_or("-")
    }

    fn database_for_log(&self) -> &str {
        self.config.database.as_deref().unwrap_or("-")
    }
}

fn run_session_statements(conn: &Connection, profile: &DriverProfile, statements: &[String]) {
    for statement in statements {
        if let Err(err) = conn.execute_batch(statement) {
            warn!(
                "event=db_session_init module=db status=error driver={} statement={} error={}",
                profile.name,
                sanitize_text(statement),
                sanitize_text(&err.to_string())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RetryPolicy;
    use std::time::Duration;

    #[test]
    fn delay_grows_linearly_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_cap: 3,
            backoff_unit: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(30));
        assert_eq!(policy.delay_for(7), Duration::from_millis(30));
    }

    #[test]
    fn default_policy_matches_documented_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(9), Duration::from_secs(5));
    }
}
