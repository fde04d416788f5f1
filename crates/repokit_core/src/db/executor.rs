//! Parameterized statement execution with timing and redacted logging.
//!
//! # Responsibility
//! - Bind named parameters, run one statement, collect rows or counts.
//! - Bucket every statement into `QueryStats`.
//! - Convert driver failures into classified `DatabaseError` values.
//!
//! # Invariants
//! - Parameters are logged only through `describe_params` (secrets masked).
//! - Driver messages placed in error context pass through `sanitize_text`.

use super::stats::{QueryStats, StatementKind};
use crate::error::{classify_sqlite_error, DatabaseError, DbResult};
use crate::model::{Record, Value};
use crate::sanitize::{describe_params, sanitize_text};
use log::{debug, error, warn};
use rusqlite::Connection;
use std::cell::RefCell;
use std::time::{Duration, Instant};

const DEFAULT_SLOW_QUERY_THRESHOLD: Duration = Duration::from_secs(1);

/// Output of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowsResult {
    /// Rows produced by SELECT or `... RETURNING` statements.
    pub rows: Vec<Record>,
    /// Rows changed by a write, or rows produced by a row-returning statement.
    pub affected: usize,
    /// Connection's last insert id after the statement ran.
    pub last_insert_id: i64,
}

impl RowsResult {
    pub fn first(&self) -> Option<&Record> {
        self.rows.first()
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }
}

/// Executes statements against a borrowed handle and keeps statistics.
#[derive(Debug)]
pub struct StatementExecutor {
    stats: RefCell<QueryStats>,
    slow_query_threshold: Duration,
}

impl Default for StatementExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementExecutor {
    pub fn new() -> Self {
        Self {
            stats: RefCell::new(QueryStats::default()),
            slow_query_threshold: DEFAULT_SLOW_QUERY_THRESHOLD,
        }
    }

    /// Statements slower than `threshold` are logged at warn level.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn stats(&self) -> QueryStats {
        *self.stats.borrow()
    }

    pub fn reset_stats(&self) {
        *self.stats.borrow_mut() = QueryStats::default();
    }

    /// Runs `sql` with named `params` (`:name` placeholders).
    ///
    /// # Errors
    /// - Any prepare/bind/step failure, classified via the error taxonomy.
    pub fn execute(
        &self,
        conn: &Connection,
        sql: &str,
        params: &[(String, Value)],
        kind: StatementKind,
    ) -> DbResult<RowsResult> {
        let started_at = Instant::now();
        let outcome = run_statement(conn, sql, params);
        let elapsed = started_at.elapsed();
        self.stats.borrow_mut().record(kind, elapsed);

        match outcome {
            Ok(result) => {
                debug!(
                    "event=db_query module=db status=ok kind={} duration_ms={} affected={} sql={} params={}",
                    kind,
                    elapsed.as_millis(),
                    result.affected,
                    flatten_sql(sql),
                    describe_params(params)
                );
                if elapsed >= self.slow_query_threshold {
                    warn!(
                        "event=db_slow_query module=db status=slow kind={} duration_ms={} sql={}",
                        kind,
                        elapsed.as_millis(),
                        flatten_sql(sql)
                    );
                }
                Ok(result)
            }
            Err(err) => {
                let (failure, error_kind) = classify_sqlite_error(&err);
                let driver_message = sanitize_text(&failure.message);
                let rendered_params = describe_params(params);
                error!(
                    "event=db_query module=db status=error kind={} duration_ms={} error_kind={} sql={} params={} error={}",
                    kind,
                    elapsed.as_millis(),
                    error_kind,
                    flatten_sql(sql),
                    rendered_params,
                    driver_message
                );
                Err(DatabaseError::new(
                    error_kind,
                    format!("{kind} statement failed: {driver_message}"),
                )
                .with_context("sql", flatten_sql(sql))
                .with_context("params", rendered_params)
                .with_context("driver_message", driver_message)
                .with_context("driver_code", failure.code.unwrap_or_default()))
            }
        }
    }
}

fn run_statement(
    conn: &Connection,
    sql: &str,
    params: &[(String, Value)],
) -> rusqlite::Result<RowsResult> {
    let mut stmt = conn.prepare(sql)?;
    for (name, value) in params {
        let index = stmt
            .parameter_index(name)?
            .ok_or_else(|| rusqlite::Error::InvalidParameterName(name.clone()))?;
        stmt.raw_bind_parameter(index, value)?;
    }

    if stmt.column_count() == 0 {
        let affected = stmt.raw_execute()?;
        return Ok(RowsResult {
            rows: Vec::new(),
            affected,
            last_insert_id: conn.last_insert_rowid(),
        });
    }

    let columns = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let mut records = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (index, column) in columns.iter().enumerate() {
            record.insert(column.clone(), Value::from_sql_ref(row.get_ref(index)?));
        }
        records.push(record);
    }

    Ok(RowsResult {
        affected: records.len(),
        rows: records,
        last_insert_id: conn.last_insert_rowid(),
    })
}

fn flatten_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
