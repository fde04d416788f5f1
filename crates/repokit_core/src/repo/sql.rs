//! SQL text generation for the generic repository.
//!
//! # Invariants
//! - Identifiers come only from `TableSchema` (`&'static str`) and are quoted
//!   per driver; every value is a bound named parameter.
//! - Equality filters are AND-combined; `Null` becomes `IS NULL`.
//! - The soft-delete clause is a separate modifier (`Visibility`) applied on
//!   top of caller conditions.

use super::schema::{TableSchema, DELETED_AT};
use crate::config::{DriverProfile, LimitStyle};
use crate::model::Value;

/// Named parameters collected while building one statement.
#[derive(Debug, Default)]
pub(crate) struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    /// Binds `value` and returns its placeholder (`:column_n`).
    pub(crate) fn bind(&mut self, column: &str, value: Value) -> String {
        let name = format!(":{column}_{}", self.values.len());
        self.values.push((name.clone(), value));
        name
    }

    pub(crate) fn as_slice(&self) -> &[(String, Value)] {
        &self.values
    }
}

/// Soft-delete visibility modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visibility {
    /// Only rows whose `deleted_at` is null.
    Alive,
    /// Every row regardless of `deleted_at`.
    WithDeleted,
    /// Only soft-deleted rows.
    OnlyDeleted,
}

/// Sort direction; anything other than `desc` (any case) means ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Resolved WHERE input: schema columns plus a visibility modifier.
#[derive(Debug, Clone)]
pub(crate) struct Filter {
    pub(crate) conditions: Vec<(&'static str, Value)>,
    pub(crate) visibility: Visibility,
}

pub(crate) enum Projection {
    Columns(Vec<&'static str>),
    Count,
}

pub(crate) struct SqlBuilder {
    profile: &'static DriverProfile,
    schema: &'static TableSchema,
}

impl SqlBuilder {
    pub(crate) fn new(profile: &'static DriverProfile, schema: &'static TableSchema) -> Self {
        Self { profile, schema }
    }

    pub(crate) fn quote(&self, identifier: &str) -> String {
        self.profile.quote_identifier(identifier)
    }

    fn table(&self) -> String {
        self.quote(self.schema.table)
    }

    /// Multi-row INSERT; every row must follow `columns` order.
    pub(crate) fn insert(
        &self,
        columns: &[&'static str],
        rows: Vec<Vec<Value>>,
        returning: Option<&'static str>,
        params: &mut Params,
    ) -> String {
        let column_list = columns
            .iter()
            .map(|column| self.quote(column))
            .collect::<Vec<_>>()
            .join(", ");
        let tuples = rows
            .into_iter()
            .map(|row| {
                let placeholders = columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| params.bind(column, value))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({placeholders})")
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("INSERT INTO {} ({column_list}) VALUES {tuples}", self.table());
        if let Some(key) = returning {
            sql.push_str(&format!(" RETURNING {}", self.quote(key)));
        }
        sql
    }

    pub(crate) fn update(
        &self,
        assignments: Vec<(&'static str, Value)>,
        filter: &Filter,
        limit: usize,
        params: &mut Params,
    ) -> String {
        let set_list = assignments
            .into_iter()
            .map(|(column, value)| format!("{} = {}", self.quote(column), params.bind(column, value)))
            .collect::<Vec<_>>()
            .join(", ");
        let target = self.limited_target(filter, limit, params);
        format!("UPDATE {} SET {set_list}{target}", self.table())
    }

    pub(crate) fn delete(&self, filter: &Filter, limit: usize, params: &mut Params) -> String {
        let target = self.limited_target(filter, limit, params);
        format!("DELETE FROM {}{target}", self.table())
    }

    pub(crate) fn select(
        &self,
        projection: &Projection,
        filter: &Filter,
        order_by: &[(&'static str, SortDirection)],
        limit: Option<u64>,
        offset: u64,
        params: &mut Params,
    ) -> String {
        let projection = match projection {
            Projection::Count => "COUNT(*) AS aggregate".to_string(),
            Projection::Columns(columns) if columns.is_empty() => "*".to_string(),
            Projection::Columns(columns) => columns
                .iter()
                .map(|column| self.quote(column))
                .collect::<Vec<_>>()
                .join(", "),
        };

        let mut sql = format!(
            "SELECT {projection} FROM {}{}",
            self.table(),
            self.where_clause(filter, params)
        );
        let has_order = !order_by.is_empty();
        if has_order {
            let order = order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", self.quote(column), direction.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        sql.push_str(&self.pagination(limit, offset, has_order));
        sql
    }

    fn where_clause(&self, filter: &Filter, params: &mut Params) -> String {
        let mut clauses = filter
            .conditions
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} IS NULL", self.quote(column))
                } else {
                    format!("{} = {}", self.quote(column), params.bind(column, value.clone()))
                }
            })
            .collect::<Vec<_>>();

        if self.schema.soft_delete {
            match filter.visibility {
                Visibility::Alive => clauses.push(format!("{} IS NULL", self.quote(DELETED_AT))),
                Visibility::OnlyDeleted => {
                    clauses.push(format!("{} IS NOT NULL", self.quote(DELETED_AT)));
                }
                Visibility::WithDeleted => {}
            }
        }

        if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        }
    }

    fn pagination(&self, limit: Option<u64>, offset: u64, has_order: bool) -> String {
        match self.profile.limit_style {
            LimitStyle::LimitOffset => match (limit, offset) {
                (Some(limit), 0) => format!(" LIMIT {limit}"),
                (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
                (None, 0) => String::new(),
                (None, offset) => format!(" LIMIT -1 OFFSET {offset}"),
            },
            LimitStyle::OffsetFetch => {
                if limit.is_none() && offset == 0 {
                    return String::new();
                }
                let mut clause = String::new();
                if !has_order {
                    clause.push_str(&format!(" ORDER BY {}", self.quote(self.schema.primary_key)));
                }
                clause.push_str(&format!(" OFFSET {offset} ROWS"));
                if let Some(limit) = limit {
                    clause.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }
                clause
            }
        }
    }

    /// WHERE clause for UPDATE/DELETE honoring an optional row limit.
    fn limited_target(&self, filter: &Filter, limit: usize, params: &mut Params) -> String {
        if limit == 0 {
            return self.where_clause(filter, params);
        }
        if self.profile.trailing_write_limit {
            return format!("{} LIMIT {limit}", self.where_clause(filter, params));
        }

        let key = self.quote(self.schema.primary_key);
        let subquery = self.select(
            &Projection::Columns(vec![self.schema.primary_key]),
            filter,
            &[],
            Some(limit as u64),
            0,
            params,
        );
        format!(" WHERE {key} IN ({subquery})")
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, Params, Projection, SortDirection, SqlBuilder, Visibility};
    use crate::config::driver_profile;
    use crate::model::Value;
    use crate::repo::schema::{FieldSpec, TableSchema};

    const FIELDS: &[FieldSpec] = &[FieldSpec::fillable("title"), FieldSpec::fillable("status")];
    static SCHEMA: TableSchema = TableSchema::new("risks", FIELDS).with_soft_delete(true);

    fn sqlite() -> SqlBuilder {
        SqlBuilder::new(driver_profile("sqlite").unwrap(), &SCHEMA)
    }

    #[test]
    fn select_appends_soft_delete_filter_and_null_checks() {
        let filter = Filter {
            conditions: vec![("status", Value::from("open")), ("title", Value::Null)],
            visibility: Visibility::Alive,
        };
        let mut params = Params::default();
        let sql = sqlite().select(
            &Projection::Columns(Vec::new()),
            &filter,
            &[("title", SortDirection::parse("desc"))],
            Some(10),
            20,
            &mut params,
        );

        assert_eq!(
            sql,
            "SELECT * FROM \"risks\" WHERE \"status\" = :status_0 AND \"title\" IS NULL AND \"deleted_at\" IS NULL ORDER BY \"title\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params.as_slice().len(), 1);
    }

    #[test]
    fn direction_is_sanitized_to_asc_or_desc() {
        assert_eq!(SortDirection::parse("DeSc"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("desc; DROP TABLE x"), SortDirection::Asc);
        assert_eq!(SortDirection::parse(""), SortDirection::Asc);
    }

    #[test]
    fn multi_row_insert_binds_every_value() {
        let mut params = Params::default();
        let sql = sqlite().insert(
            &["title", "status"],
            vec![
                vec![Value::from("a"), Value::from("open")],
                vec![Value::from("b"), Value::from("closed")],
            ],
            Some("id"),
            &mut params,
        );
        assert_eq!(
            sql,
            "INSERT INTO \"risks\" (\"title\", \"status\") VALUES (:title_0, :status_1), (:title_2, :status_3) RETURNING \"id\""
        );
        assert_eq!(params.as_slice().len(), 4);
    }

    #[test]
    fn limited_update_uses_primary_key_subquery_without_trailing_limit() {
        let filter = Filter {
            conditions: vec![("status", Value::from("open"))],
            visibility: Visibility::WithDeleted,
        };
        let mut params = Params::default();
        let sql = sqlite().update(vec![("status", Value::from("closed"))], &filter, 5, &mut params);
        assert_eq!(
            sql,
            "UPDATE \"risks\" SET \"status\" = :status_0 WHERE \"id\" IN (SELECT \"id\" FROM \"risks\" WHERE \"status\" = :status_1 LIMIT 5)"
        );

        let mysql = SqlBuilder::new(driver_profile("mysql").unwrap(), &SCHEMA);
        let mut params = Params::default();
        let sql = mysql.delete(&filter, 5, &mut params);
        assert_eq!(sql, "DELETE FROM `risks` WHERE `status` = :status_0 LIMIT 5");
    }

    #[test]
    fn offset_fetch_dialect_orders_by_primary_key_when_unordered() {
        let builder = SqlBuilder::new(driver_profile("sqlsrv").unwrap(), &SCHEMA);
        let filter = Filter {
            conditions: Vec::new(),
            visibility: Visibility::WithDeleted,
        };
        let mut params = Params::default();
        let sql = builder.select(&Projection::Count, &filter, &[], Some(3), 6, &mut params);
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS aggregate FROM [risks] ORDER BY [id] OFFSET 6 ROWS FETCH NEXT 3 ROWS ONLY"
        );
    }
}
