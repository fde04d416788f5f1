//! Typed database error surface.
//!
//! # Responsibility
//! - Define the closed error taxonomy shared by connection, executor and
//!   repository layers.
//! - Carry a status-like code and a string context map with every error.
//!
//! # Invariants
//! - Context values never contain raw credentials; callers insert only
//!   sanitized text.
//! - `ErrorKind` is closed: driver failures that match no pattern become
//!   `UnknownError`, never a new kind.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod classify;

pub use classify::{classify_message, classify_sqlite_error, DriverFailure};

pub type DbResult<T> = Result<T, DatabaseError>;

/// Closed classification of database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionFailed,
    SyntaxError,
    ConstraintViolation,
    DataNotFound,
    TransactionFailed,
    PermissionDenied,
    ConfigurationError,
    UnknownError,
}

impl ErrorKind {
    /// Stable snake_case id used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionFailed => "connection_failed",
            Self::SyntaxError => "syntax_error",
            Self::ConstraintViolation => "constraint_violation",
            Self::DataNotFound => "data_not_found",
            Self::TransactionFailed => "transaction_failed",
            Self::PermissionDenied => "permission_denied",
            Self::ConfigurationError => "configuration_error",
            Self::UnknownError => "unknown_error",
        }
    }

    /// HTTP-like status code for callers that surface errors over an API.
    pub fn status_code(self) -> u16 {
        match self {
            Self::ConnectionFailed => 503,
            Self::ConstraintViolation => 409,
            Self::DataNotFound => 404,
            Self::PermissionDenied => 403,
            Self::SyntaxError
            | Self::TransactionFailed
            | Self::ConfigurationError
            | Self::UnknownError => 500,
        }
    }

    /// Whether a connect attempt failing with this kind may be retried.
    ///
    /// Configuration and permission failures never heal on their own.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::ConnectionFailed | Self::UnknownError)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database-layer error with classification and diagnostic context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    kind: ErrorKind,
    message: String,
    code: u16,
    context: BTreeMap<String, String>,
}

impl DatabaseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: kind.status_code(),
            context: BTreeMap::new(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationError, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailed, message)
    }

    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransactionFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataNotFound, message)
    }

    /// Adds or replaces one context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merges a whole context map, keeping existing keys untouched.
    pub fn with_context_map<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.context.entry(key.into()).or_insert_with(|| value.into());
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

impl Display for DatabaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl Error for DatabaseError {}
