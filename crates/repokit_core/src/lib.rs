//! Repokit core: a small synchronous data-access layer.
//! Connection management with retry, instrumented statement execution,
//! a generic table repository and a classified error taxonomy.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod sanitize;

pub use config::ConnectionConfig;
pub use db::{
    ConnectReport, ConnectionManager, Connector, Database, QueryStats, RetryPolicy, RowsResult,
    SqliteConnector, StatementExecutor, StatementKind, TransactionCounters,
};
pub use error::{DatabaseError, DbResult, DriverFailure, ErrorKind};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{Record, Value};
pub use repo::{
    DeleteOptions, FindOptions, OrderBy, RepoError, RepoResult, Repository, TableSchema,
    ValidationError, WriteOptions,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
