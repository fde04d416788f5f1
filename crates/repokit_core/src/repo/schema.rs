//! Static table schema descriptors.
//!
//! # Invariants
//! - Every identifier that reaches generated SQL is a `&'static str` taken
//!   from a descriptor, never caller input.
//! - Audit and soft-delete columns are implied by their flags.

use super::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// One declared column and whether `create`/`update` may write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub fillable: bool,
}

impl FieldSpec {
    pub const fn fillable(name: &'static str) -> Self {
        Self {
            name,
            fillable: true,
        }
    }

    pub const fn guarded(name: &'static str) -> Self {
        Self {
            name,
            fillable: false,
        }
    }
}

/// Describes one table for the generic repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub primary_key: &'static str,
    pub fields: &'static [FieldSpec],
    /// Auto-populate `created_at` / `updated_at`.
    pub timestamps: bool,
    /// Rows are hidden via `deleted_at` instead of being removed.
    pub soft_delete: bool,
}

impl TableSchema {
    /// Schema with primary key `id`, timestamps on, soft delete off.
    pub const fn new(table: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self {
            table,
            primary_key: "id",
            fields,
            timestamps: true,
            soft_delete: false,
        }
    }

    pub const fn with_primary_key(self, primary_key: &'static str) -> Self {
        Self {
            primary_key,
            ..self
        }
    }

    pub const fn with_timestamps(self, timestamps: bool) -> Self {
        Self { timestamps, ..self }
    }

    pub const fn with_soft_delete(self, soft_delete: bool) -> Self {
        Self {
            soft_delete,
            ..self
        }
    }

    pub fn is_fillable(&self, column: &str) -> bool {
        self.fields
            .iter()
            .any(|field| field.fillable && field.name == column)
    }

    /// Resolves a caller-supplied name to the schema's own identifier.
    pub fn column(&self, name: &str) -> Option<&'static str> {
        self.columns().into_iter().find(|column| *column == name)
    }

    /// Resolves `name` or reports it as unknown.
    pub fn require_column(&self, name: &str) -> Result<&'static str, ValidationError> {
        self.column(name).ok_or_else(|| ValidationError::UnknownColumn {
            table: self.table,
            column: name.to_string(),
        })
    }

    /// All columns: primary key, declared fields, implied audit columns.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = vec![self.primary_key];
        columns.extend(
            self.fields
                .iter()
                .map(|field| field.name)
                .filter(|name| *name != self.primary_key),
        );
        if self.timestamps {
            columns.extend([CREATED_AT, UPDATED_AT]);
        }
        if self.soft_delete {
            columns.push(DELETED_AT);
        }
        dedup_preserving_order(columns)
    }

    pub fn fillable_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|field| field.fillable)
            .map(|field| field.name)
    }

    /// Checks identifiers and duplicate declarations.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = BTreeSet::new();
        for name in std::iter::once(self.table)
            .chain(std::iter::once(self.primary_key))
            .chain(self.fields.iter().map(|field| field.name))
        {
            if !IDENTIFIER_RE.is_match(name) {
                return Err(ValidationError::InvalidSchema(format!(
                    "`{name}` is not a plain SQL identifier"
                )));
            }
        }
        for field in self.fields {
            if !seen.insert(field.name) {
                return Err(ValidationError::InvalidSchema(format!(
                    "column `{}` declared twice in `{}`",
                    field.name, self.table
                )));
            }
        }
        if self.is_fillable(self.primary_key) {
            return Err(ValidationError::InvalidSchema(format!(
                "primary key `{}` of `{}` must not be fillable",
                self.primary_key, self.table
            )));
        }
        Ok(())
    }
}

fn dedup_preserving_order(columns: Vec<&'static str>) -> Vec<&'static str> {
    let mut seen = BTreeSet::new();
    columns
        .into_iter()
        .filter(|column| seen.insert(*column))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{FieldSpec, TableSchema};
    use crate::repo::ValidationError;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::fillable("title"),
        FieldSpec::fillable("status"),
        FieldSpec::guarded("owner"),
    ];
    const SCHEMA: TableSchema = TableSchema::new("risks", FIELDS).with_soft_delete(true);

    #[test]
    fn columns_include_implied_audit_columns() {
        assert_eq!(
            SCHEMA.columns(),
            vec!["id", "title", "status", "owner", "created_at", "updated_at", "deleted_at"]
        );
        assert_eq!(SCHEMA.fillable_fields().collect::<Vec<_>>(), vec!["title", "status"]);
    }

    #[test]
    fn column_resolution_rejects_unknown_names() {
        assert_eq!(SCHEMA.column("status"), Some("status"));
        let err = SCHEMA.require_column("status; DROP TABLE risks").unwrap_err();
        assert!(matches!(err, ValidationError::UnknownColumn { .. }));
    }

    #[test]
    fn validate_rejects_bad_identifiers_and_fillable_primary_key() {
        const BAD_FIELDS: &[FieldSpec] = &[FieldSpec::fillable("bad-name")];
        const BAD: TableSchema = TableSchema::new("risks", BAD_FIELDS);
        assert!(BAD.validate().is_err());

        const PK_FIELDS: &[FieldSpec] = &[FieldSpec::fillable("id")];
        const PK: TableSchema = TableSchema::new("risks", PK_FIELDS);
        assert!(PK.validate().is_err());

        assert!(SCHEMA.validate().is_ok());
    }
}
