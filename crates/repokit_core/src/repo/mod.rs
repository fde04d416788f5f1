//! Repository layer: generic table access plus typed register repositories.
//!
//! # Responsibility
//! - Turn `Record` payloads into parameterized SQL against a `Database`.
//! - Keep identifier handling inside static `TableSchema` descriptors.
//!
//! # Invariants
//! - Validation failures are reported as `RepoError::Validation` and never
//!   reach the database.
//! - Driver failures surface as `RepoError::Database` with their original
//!   classification.

mod error;
pub mod risk_repo;
mod schema;
mod sql;
mod table_repo;

pub use error::{RepoError, RepoResult, ValidationError, VALIDATION_STATUS_CODE};
pub use risk_repo::{
    NewRisk, Risk, RiskRepository, RiskReview, RiskStatus, SqlRiskRepository, RISK_REVIEW_SCHEMA,
    RISK_SCHEMA,
};
pub use schema::{FieldSpec, TableSchema, CREATED_AT, DELETED_AT, UPDATED_AT};
pub use sql::SortDirection;
pub use table_repo::{DeleteOptions, FindOptions, OrderBy, Repository, WriteOptions};
