//! Pattern-based classification of raw driver failures.
//!
//! # Responsibility
//! - Map driver messages and state codes onto the closed `ErrorKind` set.
//! - Convert `rusqlite::Error` values into `DriverFailure` + `ErrorKind`.
//!
//! # Invariants
//! - Classification is pure: same message and code always yield same kind.
//! - State codes win over message text when both are recognized.

use super::ErrorKind;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::ErrorCode;

/// Raw failure reported by a driver before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFailure {
    /// Driver message text as reported (may contain sensitive values).
    pub message: String,
    /// Driver-specific state code (SQLSTATE or SQLite extended code).
    pub code: Option<String>,
}

impl DriverFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        classify_message(&self.message, self.code.as_deref())
    }
}

// Order matters: configuration phrasing (e.g. "access denied for user") must
// win over the generic permission phrasing that follows it.
static MESSAGE_RULES: Lazy<Vec<(Regex, ErrorKind)>> = Lazy::new(|| {
    [
        (
            r"could not find driver|driver not available|unknown database|database .+ does not exist|unknown table|no such table|unable to open database|not a database|access denied for user|password authentication failed|authentication failed|login failed|getaddrinfo|name or service not known|unknown (mysql )?server host|could not translate host name|no such host",
            ErrorKind::ConfigurationError,
        ),
        (
            r"duplicate|unique|foreign key|integrity constraint|constraint failed|not null constraint|check constraint",
            ErrorKind::ConstraintViolation,
        ),
        (
            r"access denied|permission denied|insufficient privilege|not authorized|readonly database|read-only",
            ErrorKind::PermissionDenied,
        ),
        (
            r"syntax error|no such column|unknown column|incomplete input|parse error|near .+: syntax",
            ErrorKind::SyntaxError,
        ),
        (
            r"deadlock|cannot start a transaction within a transaction|cannot commit|cannot rollback|no transaction is active|serialization failure",
            ErrorKind::TransactionFailed,
        ),
        (
            r"connection refused|server has gone away|lost connection|connection reset|timed out|timeout|could not connect|can't connect|broken pipe|network is unreachable|no route to host|database is locked|database is busy|connection closed",
            ErrorKind::ConnectionFailed,
        ),
        (r"no rows|not found", ErrorKind::DataNotFound),
    ]
    .into_iter()
    .map(|(pattern, kind)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("valid classifier regex");
        (regex, kind)
    })
    .collect()
});

/// Classifies a driver message with an optional SQLSTATE-style code.
pub fn classify_message(message: &str, code: Option<&str>) -> ErrorKind {
    if let Some(kind) = code.and_then(classify_sqlstate) {
        return kind;
    }

    MESSAGE_RULES
        .iter()
        .find(|(regex, _)| regex.is_match(message))
        .map_or(ErrorKind::UnknownError, |(_, kind)| *kind)
}

fn classify_sqlstate(code: &str) -> Option<ErrorKind> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 5 {
        return None;
    }

    match code.as_str() {
        "42S02" | "3D000" | "IM002" => return Some(ErrorKind::ConfigurationError),
        "42501" => return Some(ErrorKind::PermissionDenied),
        _ => {}
    }

    match &code[..2] {
        "23" => Some(ErrorKind::ConstraintViolation),
        "42" => Some(ErrorKind::SyntaxError),
        "08" => Some(ErrorKind::ConnectionFailed),
        "28" => Some(ErrorKind::ConfigurationError),
        "40" => Some(ErrorKind::TransactionFailed),
        "02" => Some(ErrorKind::DataNotFound),
        _ => None,
    }
}

/// Splits a `rusqlite::Error` into a raw failure and its classification.
pub fn classify_sqlite_error(err: &rusqlite::Error) -> (DriverFailure, ErrorKind) {
    match err {
        rusqlite::Error::SqliteFailure(inner, message) => {
            let text = message.clone().unwrap_or_else(|| inner.to_string());
            let failure = DriverFailure::with_code(text, format!("sqlite:{}", inner.extended_code));
            let kind = match inner.code {
                ErrorCode::ConstraintViolation => ErrorKind::ConstraintViolation,
                ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::AuthorizationForStatementDenied => ErrorKind::PermissionDenied,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ErrorKind::ConnectionFailed,
                ErrorCode::CannotOpen | ErrorCode::NotADatabase => ErrorKind::ConfigurationError,
                _ => classify_message(&failure.message, None),
            };
            (failure, kind)
        }
        rusqlite::Error::QueryReturnedNoRows => (
            DriverFailure::new("query returned no rows"),
            ErrorKind::DataNotFound,
        ),
        other => {
            let failure = DriverFailure::new(other.to_string());
            let kind = classify_message(&failure.message, None);
            (failure, kind)
        }
    }
}
