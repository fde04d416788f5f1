//! Repository error types.

use crate::error::{DatabaseError, ErrorKind};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Status code reported for validation failures.
pub const VALIDATION_STATUS_CODE: u16 = 422;

/// Input rejected before any statement reached the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Payload has no writable columns after whitelist filtering.
    EmptyPayload {
        table: &'static str,
        index: Option<usize>,
    },
    /// Table-wide write attempted without conditions.
    EmptyConditions {
        table: &'static str,
        operation: &'static str,
    },
    /// Column name not declared in the table schema.
    UnknownColumn {
        table: &'static str,
        column: String,
    },
    /// Batch record reduces to a different column set than its chunk.
    ColumnSetMismatch {
        table: &'static str,
        index: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// Option set that the operation does not honor.
    UnsupportedOption {
        table: &'static str,
        operation: &'static str,
        option: &'static str,
    },
    /// Schema descriptor itself is malformed.
    InvalidSchema(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPayload { table, index: None } => {
                write!(f, "no writable columns in payload for `{table}`")
            }
            Self::EmptyPayload {
                table,
                index: Some(index),
            } => write!(
                f,
                "no writable columns in payload for `{table}` at record index {index}"
            ),
            Self::EmptyConditions { table, operation } => write!(
                f,
                "{operation} on `{table}` requires at least one condition"
            ),
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column `{column}` for table `{table}`")
            }
            Self::ColumnSetMismatch {
                table,
                index,
                expected,
                found,
            } => write!(
                f,
                "batch record index {index} for `{table}` has columns [{}], expected [{}]",
                found.join(", "),
                expected.join(", ")
            ),
            Self::UnsupportedOption {
                table,
                operation,
                option,
            } => write!(f, "{operation} on `{table}` does not accept `{option}`"),
            Self::InvalidSchema(message) => write!(f, "invalid table schema: {message}"),
        }
    }
}

impl Error for ValidationError {}

/// Error returned by repository operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Database(DatabaseError),
    /// Persisted row cannot be mapped to its typed model.
    InvalidData(String),
}

impl RepoError {
    /// Database taxonomy kind, when the failure came from the database.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Database(err) => Some(err.kind()),
            Self::Validation(_) | Self::InvalidData(_) => None,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => VALIDATION_STATUS_CODE,
            Self::Database(err) => err.code(),
            Self::InvalidData(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::DataNotFound)
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Database(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Database(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DatabaseError> for RepoError {
    fn from(value: DatabaseError) -> Self {
        Self::Database(value)
    }
}
