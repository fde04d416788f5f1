//! Generic table repository over a `Database` context.
//!
//! # Responsibility
//! - CRUD, batch writes, equality finds and soft delete for any table
//!   described by a static `TableSchema`.
//! - Stamp audit columns and filter payloads to fillable fields.
//!
//! # Invariants
//! - Validation (payload, conditions, column names) completes before the
//!   first statement of an operation is issued.
//! - Table-wide writes require at least one condition.
//! - Soft-deleted rows are invisible to finds, counts and existence checks
//!   unless `include_deleted`.

use super::error::{RepoError, RepoResult, ValidationError};
use super::schema::{TableSchema, CREATED_AT, DELETED_AT, UPDATED_AT};
use super::sql::{Filter, Params, Projection, SortDirection, SqlBuilder, Visibility};
use crate::config::GeneratedKeys;
use crate::db::{Database, StatementKind};
use crate::error::DatabaseError;
use crate::model::{Record, Value};
use log::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Options for single-row writes.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Drop payload columns that are not declared fillable.
    pub enforce_whitelist: bool,
    /// Extra equality conditions ANDed with the primary key. Updates only;
    /// `create_with` rejects a non-empty value.
    pub extra_conditions: Record,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            enforce_whitelist: true,
            extra_conditions: Record::new(),
        }
    }
}

/// Options for `delete_with`. The default is a physical delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Soft delete when the table supports it; physical delete otherwise.
    pub soft: bool,
    pub extra_conditions: Record,
}

impl DeleteOptions {
    pub fn soft() -> Self {
        Self {
            soft: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    /// `direction` is sanitized: only `desc` (any case) sorts descending.
    pub fn new(column: impl Into<String>, direction: &str) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::parse(direction),
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Options for `find_by` / `find_all`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Projection; empty selects every column.
    pub columns: Vec<String>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub order_by: Vec<OrderBy>,
    pub include_deleted: bool,
}

#[derive(Clone, Copy)]
enum Stamp {
    Create,
    Update,
}

type Payload = Vec<(&'static str, Value)>;

/// Repository for one table, borrowing the caller's `Database`.
pub struct Repository<'db> {
    db: &'db Database,
    schema: &'static TableSchema,
}

impl<'db> Repository<'db> {
    /// # Errors
    /// - `ValidationError::InvalidSchema` for malformed descriptors.
    pub fn try_new(db: &'db Database, schema: &'static TableSchema) -> RepoResult<Self> {
        schema.validate()?;
        Ok(Self { db, schema })
    }

    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Inserts one row and returns its primary key.
    pub fn create(&self, data: &Record) -> RepoResult<i64> {
        self.create_with(data, &WriteOptions::default())
    }

    /// Key read-back runs in the same transaction scope as the INSERT, so a
    /// key that cannot be read leaves no row behind.
    pub fn create_with(&self, data: &Record, options: &WriteOptions) -> RepoResult<i64> {
        if !options.extra_conditions.is_empty() {
            return Err(ValidationError::UnsupportedOption {
                table: self.schema.table,
                operation: "create",
                option: "extra_conditions",
            }
            .into());
        }
        let payload = self.prepare_payload(data, options.enforce_whitelist, Stamp::Create, None)?;
        let (columns, values): (Vec<_>, Vec<_>) = payload.into_iter().unzip();
        let ids = self
            .db
            .transaction(|| self.insert_rows(&columns, vec![values]))?;
        let id = ids.first().copied().ok_or_else(|| {
            RepoError::InvalidData(format!("insert into `{}` reported no key", self.schema.table))
        })?;
        debug!(
            "event=repo_create module=repo status=ok table={} id={}",
            self.schema.table, id
        );
        Ok(id)
    }

    /// Inserts `records` in chunks of `batch_size` (0 means one chunk).
    ///
    /// Every chunk is validated before the first INSERT; all chunks run in
    /// one transaction scope. Returns ids in input order.
    pub fn batch_create(&self, records: &[Record], batch_size: usize) -> RepoResult<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = if batch_size == 0 {
            records.len()
        } else {
            batch_size
        };

        let mut chunks = Vec::new();
        for (chunk_index, chunk) in records.chunks(chunk_size).enumerate() {
            let mut columns: Option<Vec<&'static str>> = None;
            let mut rows = Vec::with_capacity(chunk.len());
            for (offset, record) in chunk.iter().enumerate() {
                let index = chunk_index * chunk_size + offset;
                let mut payload = self.prepare_payload(record, true, Stamp::Create, Some(index))?;
                payload.sort_by(|left, right| left.0.cmp(right.0));
                let (row_columns, values): (Vec<_>, Vec<_>) = payload.into_iter().unzip();
                let expected = columns.get_or_insert_with(|| row_columns.clone());
                if *expected != row_columns {
                    return Err(ValidationError::ColumnSetMismatch {
                        table: self.schema.table,
                        index,
                        expected: expected.iter().map(|c| c.to_string()).collect(),
                        found: row_columns.iter().map(|c| c.to_string()).collect(),
                    }
                    .into());
                }
                rows.push(values);
            }
            chunks.push((columns.unwrap_or_default(), rows));
        }

        let chunk_count = chunks.len();
        let ids = self.db.transaction(|| {
            let mut ids = Vec::with_capacity(records.len());
            for (columns, rows) in chunks {
                ids.extend(self.insert_rows(&columns, rows)?);
            }
            Ok::<_, RepoError>(ids)
        })?;
        info!(
            "event=repo_batch_create module=repo status=ok table={} rows={} chunks={}",
            self.schema.table,
            ids.len(),
            chunk_count
        );
        Ok(ids)
    }

    /// Updates one row by primary key; `false` when nothing changed.
    pub fn update(&self, id: i64, data: &Record) -> RepoResult<bool> {
        self.update_with(id, data, &WriteOptions::default())
    }

    pub fn update_with(&self, id: i64, data: &Record, options: &WriteOptions) -> RepoResult<bool> {
        let payload = self.prepare_payload(data, options.enforce_whitelist, Stamp::Update, None)?;
        let filter = self.id_filter(id, &options.extra_conditions, Visibility::WithDeleted)?;
        let affected = self.run_update(payload, &filter, 0)?;
        if affected == 0 {
            warn!(
                "event=repo_update module=repo status=noop table={} id={} data={}",
                self.schema.table,
                id,
                data.describe()
            );
        }
        Ok(affected > 0)
    }

    /// Updates every row matching `conditions`; `limit` 0 means unbounded.
    ///
    /// # Errors
    /// - `EmptyConditions` / `EmptyPayload` before any statement.
    pub fn batch_update(&self, data: &Record, conditions: &Record, limit: usize) -> RepoResult<usize> {
        let conditions = self.require_conditions(conditions, "batch_update")?;
        let payload = self.prepare_payload(data, true, Stamp::Update, None)?;
        let filter = Filter {
            conditions,
            visibility: Visibility::WithDeleted,
        };
        self.run_update(payload, &filter, limit)
    }

    /// Physically deletes one row by primary key.
    pub fn delete(&self, id: i64) -> RepoResult<bool> {
        self.delete_with(id, &DeleteOptions::default())
    }

    pub fn delete_with(&self, id: i64, options: &DeleteOptions) -> RepoResult<bool> {
        let soft = self.use_soft_delete(options.soft);
        let visibility = if soft {
            Visibility::Alive
        } else {
            Visibility::WithDeleted
        };
        let filter = self.id_filter(id, &options.extra_conditions, visibility)?;
        let affected = self.run_delete(&filter, soft, 0)?;
        debug!(
            "event=repo_delete module=repo status=ok table={} id={} soft={} affected={}",
            self.schema.table, id, soft, affected
        );
        Ok(affected > 0)
    }

    /// Deletes every row matching `conditions`; `limit` 0 means unbounded.
    pub fn batch_delete(&self, conditions: &Record, soft: bool, limit: usize) -> RepoResult<usize> {
        let conditions = self.require_conditions(conditions, "batch_delete")?;
        let soft = self.use_soft_delete(soft);
        let filter = Filter {
            conditions,
            visibility: if soft {
                Visibility::Alive
            } else {
                Visibility::WithDeleted
            },
        };
        self.run_delete(&filter, soft, limit)
    }

    /// Clears `deleted_at` on a soft-deleted row.
    pub fn restore(&self, id: i64) -> RepoResult<bool> {
        if !self.schema.soft_delete {
            return Err(ValidationError::InvalidSchema(format!(
                "`{}` does not support soft delete",
                self.schema.table
            ))
            .into());
        }
        let mut payload = vec![(DELETED_AT, Value::Null)];
        if self.schema.timestamps {
            payload.push((UPDATED_AT, now()));
        }
        let filter = self.id_filter(id, &Record::new(), Visibility::OnlyDeleted)?;
        Ok(self.run_update(payload, &filter, 0)? > 0)
    }

    pub fn find_by_id(&self, id: i64) -> RepoResult<Option<Record>> {
        self.find_by_id_with(id, false)
    }

    pub fn find_by_id_with(&self, id: i64, include_deleted: bool) -> RepoResult<Option<Record>> {
        let conditions = Record::new().with(self.schema.primary_key, id);
        let options = FindOptions {
            limit: Some(1),
            include_deleted,
            ..FindOptions::default()
        };
        Ok(self.find_by(&conditions, &options)?.into_iter().next())
    }

    /// # Errors
    /// - `DataNotFound` when no visible row has `id`.
    pub fn find_or_fail(&self, id: i64) -> RepoResult<Record> {
        self.find_by_id(id)?.ok_or_else(|| {
            DatabaseError::not_found(format!("no `{}` row with id {id}", self.schema.table))
                .with_context("table", self.schema.table)
                .with_context("id", id.to_string())
                .into()
        })
    }

    pub fn find_one_by(&self, conditions: &Record) -> RepoResult<Option<Record>> {
        let options = FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        };
        Ok(self.find_by(conditions, &options)?.into_iter().next())
    }

    /// AND-combined equality lookup.
    pub fn find_by(&self, conditions: &Record, options: &FindOptions) -> RepoResult<Vec<Record>> {
        let filter = Filter {
            conditions: self.resolve_conditions(conditions)?,
            visibility: visibility_for(options.include_deleted),
        };
        let columns = options
            .columns
            .iter()
            .map(|column| self.schema.require_column(column))
            .collect::<Result<Vec<_>, _>>()?;
        let order_by = options
            .order_by
            .iter()
            .map(|order| {
                self.schema
                    .require_column(&order.column)
                    .map(|column| (column, order.direction))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut params = Params::default();
        let sql = self.builder().select(
            &Projection::Columns(columns),
            &filter,
            &order_by,
            options.limit,
            options.offset,
            &mut params,
        );
        let result = self
            .db
            .execute(&sql, params.as_slice(), StatementKind::Select)?;
        Ok(result.into_rows())
    }

    pub fn find_all(&self, options: &FindOptions) -> RepoResult<Vec<Record>> {
        self.find_by(&Record::new(), options)
    }

    pub fn exists(&self, conditions: &Record) -> RepoResult<bool> {
        self.exists_with(conditions, false)
    }

    pub fn exists_with(&self, conditions: &Record, include_deleted: bool) -> RepoResult<bool> {
        let options = FindOptions {
            columns: vec![self.schema.primary_key.to_string()],
            limit: Some(1),
            include_deleted,
            ..FindOptions::default()
        };
        Ok(!self.find_by(conditions, &options)?.is_empty())
    }

    /// Number of visible rows matching `conditions`.
    pub fn count(&self, conditions: &Record) -> RepoResult<usize> {
        self.count_with(conditions, false)
    }

    pub fn count_with(&self, conditions: &Record, include_deleted: bool) -> RepoResult<usize> {
        let filter = Filter {
            conditions: self.resolve_conditions(conditions)?,
            visibility: visibility_for(include_deleted),
        };
        let mut params = Params::default();
        let sql = self
            .builder()
            .select(&Projection::Count, &filter, &[], None, 0, &mut params);
        let result = self
            .db
            .execute(&sql, params.as_slice(), StatementKind::Select)?;
        let count = result
            .first()
            .and_then(|row| row.get_i64("aggregate"))
            .ok_or_else(|| {
                RepoError::InvalidData(format!("count on `{}` returned no value", self.schema.table))
            })?;
        usize::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
    }

    /// Runs `f` in a nestable transaction on the shared `Database`.
    pub fn transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        F: FnOnce() -> RepoResult<T>,
    {
        self.db.transaction(f)
    }

    fn builder(&self) -> SqlBuilder {
        SqlBuilder::new(self.db.driver_profile(), self.schema)
    }

    fn use_soft_delete(&self, requested: bool) -> bool {
        if requested && !self.schema.soft_delete {
            debug!(
                "event=repo_delete module=repo status=fallback table={} reason=soft_delete_unsupported",
                self.schema.table
            );
        }
        requested && self.schema.soft_delete
    }

    fn run_update(&self, payload: Payload, filter: &Filter, limit: usize) -> RepoResult<usize> {
        let mut params = Params::default();
        let sql = self.builder().update(payload, filter, limit, &mut params);
        let result = self
            .db
            .execute(&sql, params.as_slice(), StatementKind::Update)?;
        Ok(result.affected)
    }

    fn run_delete(&self, filter: &Filter, soft: bool, limit: usize) -> RepoResult<usize> {
        if soft {
            let stamp = now();
            let mut payload = vec![(DELETED_AT, stamp.clone())];
            if self.schema.timestamps {
                payload.push((UPDATED_AT, stamp));
            }
            return self.run_update(payload, filter, limit);
        }

        let mut params = Params::default();
        let sql = self.builder().delete(filter, limit, &mut params);
        let result = self
            .db
            .execute(&sql, params.as_slice(), StatementKind::Delete)?;
        Ok(result.affected)
    }

    fn insert_rows(&self, columns: &[&'static str], rows: Vec<Vec<Value>>) -> RepoResult<Vec<i64>> {
        let row_count = rows.len();
        let key = self.schema.primary_key;
        let generated = self.db.driver_profile().generated_keys;
        let returning = (generated == GeneratedKeys::Returning).then_some(key);

        let mut params = Params::default();
        let sql = self.builder().insert(columns, rows, returning, &mut params);
        let result = self
            .db
            .execute(&sql, params.as_slice(), StatementKind::Insert)?;

        match generated {
            GeneratedKeys::Returning => {
                let mut ids = result
                    .rows
                    .iter()
                    .map(|row| row.get_i64(key))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        RepoError::InvalidData(format!(
                            "`{}`.`{key}` is not an integer key",
                            self.schema.table
                        ))
                    })?;
                ids.sort_unstable();
                Ok(ids)
            }
            GeneratedKeys::LastInsertIdFirst => {
                let first = result.last_insert_id;
                Ok((0..row_count as i64).map(|offset| first + offset).collect())
            }
        }
    }

    fn prepare_payload(
        &self,
        data: &Record,
        enforce_whitelist: bool,
        stamp: Stamp,
        index: Option<usize>,
    ) -> RepoResult<Payload> {
        let mut payload = Payload::with_capacity(data.len() + 2);
        for (name, value) in data.iter() {
            let column = if enforce_whitelist {
                match self.schema.column(name).filter(|c| self.schema.is_fillable(c)) {
                    Some(column) => column,
                    None => {
                        debug!(
                            "event=repo_payload module=repo status=dropped table={} column={}",
                            self.schema.table, name
                        );
                        continue;
                    }
                }
            } else {
                self.schema.require_column(name)?
            };
            payload.push((column, value.clone()));
        }

        if payload.is_empty() {
            return Err(ValidationError::EmptyPayload {
                table: self.schema.table,
                index,
            }
            .into());
        }

        if self.schema.timestamps {
            let stamp_value = now();
            let stamped: &[&'static str] = match stamp {
                Stamp::Create => &[CREATED_AT, UPDATED_AT],
                Stamp::Update => &[UPDATED_AT],
            };
            for &column in stamped {
                if !payload.iter().any(|(existing, _)| *existing == column) {
                    payload.push((column, stamp_value.clone()));
                }
            }
        }
        Ok(payload)
    }

    fn resolve_conditions(&self, conditions: &Record) -> RepoResult<Payload> {
        conditions
            .iter()
            .map(|(name, value)| -> RepoResult<(&'static str, Value)> {
                Ok((self.schema.require_column(name)?, value.clone()))
            })
            .collect()
    }

    fn require_conditions(&self, conditions: &Record, operation: &'static str) -> RepoResult<Payload> {
        if conditions.is_empty() {
            return Err(ValidationError::EmptyConditions {
                table: self.schema.table,
                operation,
            }
            .into());
        }
        self.resolve_conditions(conditions)
    }

    fn id_filter(&self, id: i64, extra: &Record, visibility: Visibility) -> RepoResult<Filter> {
        let mut conditions = vec![(self.schema.primary_key, Value::Integer(id))];
        conditions.extend(self.resolve_conditions(extra)?);
        Ok(Filter {
            conditions,
            visibility,
        })
    }
}

fn visibility_for(include_deleted: bool) -> Visibility {
    if include_deleted {
        Visibility::WithDeleted
    } else {
        Visibility::Alive
    }
}

fn now() -> Value {
    Value::Text(chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string())
}
