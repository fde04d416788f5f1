//! Database context: connection manager, executor and transaction state.
//!
//! # Responsibility
//! - Compose `ConnectionManager`, `StatementExecutor` and the transaction
//!   nesting state into one explicit context passed to repositories.
//! - Own physical BEGIN/COMMIT/ROLLBACK issuance.
//!
//! # Invariants
//! - All repository statements funnel through `Database::execute`.
//! - A `Database` is `Send` but not `Sync`: one handle per worker thread.
//!   Share nothing across threads; open one `Database` per worker instead.
//! - While a transaction is open the handle is never swapped; a dead handle
//!   inside a transaction surfaces `ConnectionFailed`.
//! - Transactions have no timeout. Holding one open on a file database can
//!   block writers on other workers' connections until the busy timeout.

use crate::config::{ConnectionConfig, DriverProfile};
use crate::error::{classify_sqlite_error, DatabaseError, DbResult, ErrorKind};
use crate::model::Value;
use crate::sanitize::sanitize_text;
use log::{debug, error, warn};
use rusqlite::{Connection, InterruptHandle};
use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;

mod connector;
mod executor;
mod manager;
pub mod migrations;
mod stats;
mod transaction;

pub use connector::{Connector, SqliteConnector};
pub use executor::{RowsResult, StatementExecutor};
pub use manager::{ConnectReport, ConnectionManager, RetryPolicy};
pub use stats::{QueryStats, StatementKind};
pub use transaction::TransactionCounters;

use transaction::{Physical, TransactionState};

/// Explicit database context shared by repositories on one thread.
pub struct Database {
    manager: RefCell<ConnectionManager>,
    executor: StatementExecutor,
    transaction: RefCell<TransactionState>,
}

impl Database {
    /// Wraps a manager; the connection is opened lazily on first use.
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager: RefCell::new(manager),
            executor: StatementExecutor::new(),
            transaction: RefCell::new(TransactionState::default()),
        }
    }

    /// Validates `config` and opens the connection eagerly.
    pub fn connect(config: ConnectionConfig) -> DbResult<Self> {
        let db = Self::new(ConnectionManager::new(config)?);
        db.manager.borrow_mut().get_connection(false)?;
        Ok(db)
    }

    /// Opens a SQLite database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::connect(ConnectionConfig::sqlite(path))
    }

    /// Opens a private in-memory SQLite database.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::connect(ConnectionConfig::sqlite_in_memory())
    }

    /// Replaces the executor's slow-query threshold.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.executor = self.executor.with_slow_query_threshold(threshold);
        self
    }

    pub fn driver_profile(&self) -> &'static DriverProfile {
        self.manager.borrow().profile()
    }

    /// Executes one statement on the managed handle.
    pub fn execute(
        &self,
        sql: &str,
        params: &[(String, Value)],
        kind: StatementKind,
    ) -> DbResult<RowsResult> {
        self.with_connection(|conn| self.executor.execute(conn, sql, params, kind))
    }

    /// Runs raw SQL script text (DDL, pragmas); not counted in statistics.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch(sql)
                .map_err(|err| {
                    sqlite_error("batch execution failed", &err, ErrorKind::UnknownError)
                })
        })
    }

    /// Applies bundled SQLite schema migrations.
    pub fn run_migrations(&self) -> DbResult<u32> {
        if self.driver_profile().name != "sqlite" {
            return Err(DatabaseError::configuration(
                "bundled migrations are only available for sqlite",
            ));
        }
        if self.transaction_level() > 0 {
            return Err(DatabaseError::transaction_failed(
                "migrations cannot run inside an open transaction",
            ));
        }
        self.with_connection(migrations::apply_migrations)
    }

    /// Forces a fresh handle. Rejected while a transaction is open.
    pub fn reconnect(&self) -> DbResult<()> {
        if self.transaction_level() > 0 {
            return Err(DatabaseError::transaction_failed(
                "cannot reconnect while a transaction is open",
            ));
        }
        self.manager.borrow_mut().get_connection(true)?;
        Ok(())
    }

    /// Liveness probe on the current handle.
    pub fn ping(&self) -> bool {
        self.manager.borrow().is_alive()
    }

    pub fn interrupt_handle(&self) -> Option<InterruptHandle> {
        self.manager.borrow().interrupt_handle()
    }

    pub fn last_connect_report(&self) -> Option<ConnectReport> {
        self.manager.borrow().last_connect_report()
    }

    pub fn query_stats(&self) -> QueryStats {
        self.executor.stats()
    }

    pub fn reset_query_stats(&self) {
        self.executor.reset_stats();
    }

    pub fn transaction_counters(&self) -> TransactionCounters {
        self.transaction.borrow().counters()
    }

    pub fn transaction_level(&self) -> u32 {
        self.transaction.borrow().level()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_level() > 0
    }

    /// Enters one transaction scope; physical BEGIN only from idle.
    pub fn begin_transaction(&self) -> DbResult<()> {
        let physical = self.transaction.borrow().plan_begin();
        if physical == Physical::Send {
            let begin_sql = self.driver_profile().begin_sql;
            self.with_connection(|conn| {
                conn.execute_batch(begin_sql)
                    .map_err(|err| {
                        sqlite_error("begin transaction failed", &err, ErrorKind::TransactionFailed)
                    })
            })?;
        }

        let mut state = self.transaction.borrow_mut();
        state.began(physical);
        debug!(
            "event=db_tx_begin module=db status=ok level={} physical={}",
            state.level(),
            physical == Physical::Send
        );
        Ok(())
    }

    /// Leaves one transaction scope; physical COMMIT only back to idle.
    ///
    /// # Errors
    /// - `TransactionFailed` when no transaction is open.
    /// - Driver failure of the physical COMMIT (level is left unchanged so
    ///   the caller can roll back).
    pub fn commit(&self) -> DbResult<()> {
        let physical = self.transaction.borrow().plan_commit().map_err(|err| {
            error!("event=db_tx_commit module=db status=error reason=no_active_transaction");
            err
        })?;
        if physical == Physical::Send {
            self.with_connection(|conn| {
                conn.execute_batch("COMMIT")
                    .map_err(|err| {
                        sqlite_error("commit failed", &err, ErrorKind::TransactionFailed)
                    })
            })?;
        }

        let mut state = self.transaction.borrow_mut();
        state.committed(physical);
        debug!(
            "event=db_tx_commit module=db status=ok level={} physical={}",
            state.level(),
            physical == Physical::Send
        );
        Ok(())
    }

    /// Abandons every open scope; physical ROLLBACK iff the handle is
    /// inside a transaction.
    pub fn rollback(&self) -> DbResult<()> {
        let open_on_server = self
            .manager
            .borrow()
            .current()
            .is_some_and(|conn| !conn.is_autocommit());

        let result = if open_on_server {
            self.manager
                .borrow()
                .current()
                .map_or(Ok(()), |conn| conn.execute_batch("ROLLBACK"))
                .map_err(|err| {
                    sqlite_error("rollback failed", &err, ErrorKind::TransactionFailed)
                })
        } else {
            Ok(())
        };

        let physical = if open_on_server && result.is_ok() {
            Physical::Send
        } else {
            Physical::Skip
        };
        let abandoned = self.transaction.borrow_mut().reset(physical);
        debug!(
            "event=db_tx_rollback module=db status={} abandoned_level={} physical={}",
            if result.is_ok() { "ok" } else { "error" },
            abandoned,
            physical == Physical::Send
        );
        result
    }

    /// Runs `f` inside a (possibly nested) transaction scope.
    ///
    /// Commits when `f` returns `Ok`; rolls back and returns `f`'s error
    /// otherwise. A panic unwinding out of `f` also rolls back.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<DatabaseError>,
    {
        self.begin_transaction()?;
        let mut guard = RollbackGuard {
            db: self,
            armed: true,
        };

        match f() {
            Ok(value) => match self.commit() {
                Ok(()) => {
                    guard.armed = false;
                    Ok(value)
                }
                Err(err) => {
                    guard.rollback("commit_failed");
                    Err(err.into())
                }
            },
            Err(err) => {
                guard.rollback("callback_error");
                Err(err)
            }
        }
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let mut manager = self.manager.borrow_mut();
        if self.transaction_level() > 0 {
            let conn = manager.current().filter(|_| manager.is_alive()).ok_or_else(|| {
                DatabaseError::connection_failed(
                    "connection lost while a transaction was open; transaction abandoned",
                )
                .with_context("transaction_level", self.transaction_level().to_string())
            })?;
            return f(conn);
        }

        let conn = manager.get_connection(false)?;
        f(conn)
    }
}

struct RollbackGuard<'db> {
    db: &'db Database,
    armed: bool,
}

impl RollbackGuard<'_> {
    fn rollback(&mut self, reason: &str) {
        self.armed = false;
        if let Err(err) = self.db.rollback() {
            warn!(
                "event=db_tx_rollback module=db status=error reason={} error={}",
                reason, err
            );
        }
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.rollback("unwind");
        }
    }
}

fn sqlite_error(context: &str, err: &rusqlite::Error, fallback: ErrorKind) -> DatabaseError {
    let (failure, kind) = classify_sqlite_error(err);
    let kind = if kind == ErrorKind::UnknownError {
        fallback
    } else {
        kind
    };
    let message = sanitize_text(&failure.message);
    DatabaseError::new(kind, format!("{context}: {message}"))
        .with_context("driver_message", message)
        .with_context("driver_code", failure.code.unwrap_or_default())
}
