//! Risk register repository built on the generic `Repository`.
//!
//! # Responsibility
//! - Map typed risk models to `Record` payloads and back.
//! - Compose generic CRUD into register use cases (status changes,
//!   reviews, bulk import).
//!
//! # Invariants
//! - `owner` is guarded: only `assign_owner` may write it.
//! - Read paths reject malformed persisted rows instead of masking them.

use super::error::{RepoError, RepoResult};
use super::schema::{FieldSpec, TableSchema, CREATED_AT, DELETED_AT, UPDATED_AT};
use super::table_repo::{DeleteOptions, FindOptions, OrderBy, Repository, WriteOptions};
use crate::db::Database;
use crate::model::{Record, Value};
use log::info;
use serde::Serialize;
use std::fmt::{Display, Formatter};

const RISK_FIELDS: &[FieldSpec] = &[
    FieldSpec::fillable("title"),
    FieldSpec::fillable("description"),
    FieldSpec::fillable("probability"),
    FieldSpec::fillable("impact"),
    FieldSpec::fillable("status"),
    FieldSpec::guarded("owner"),
];

const RISK_REVIEW_FIELDS: &[FieldSpec] = &[
    FieldSpec::fillable("risk_id"),
    FieldSpec::fillable("reviewer"),
    FieldSpec::fillable("notes"),
];

pub static RISK_SCHEMA: TableSchema = TableSchema::new("risks", RISK_FIELDS).with_soft_delete(true);
pub static RISK_REVIEW_SCHEMA: TableSchema = TableSchema::new("risk_reviews", RISK_REVIEW_FIELDS);

/// Lifecycle state of a risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    Identified,
    Assessed,
    Mitigating,
    Closed,
}

impl RiskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identified => "identified",
            Self::Assessed => "assessed",
            Self::Mitigating => "mitigating",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "identified" => Some(Self::Identified),
            "assessed" => Some(Self::Assessed),
            "mitigating" => Some(Self::Mitigating),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl Display for RiskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted risk row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Risk {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub probability: i64,
    pub impact: i64,
    pub status: RiskStatus,
    pub owner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl Risk {
    /// Probability times impact, 1..=25.
    pub fn score(&self) -> i64 {
        self.probability * self.impact
    }
}

/// Input for creating a risk. Probability and impact are 1..=5; the
/// table's CHECK constraints reject anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRisk {
    pub title: String,
    pub description: Option<String>,
    pub probability: i64,
    pub impact: i64,
}

impl NewRisk {
    pub fn new(title: impl Into<String>, probability: i64, impact: i64) -> Self {
        Self {
            title: title.into(),
            description: None,
            probability,
            impact,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("title", self.title.as_str())
            .with("description", self.description.clone())
            .with("probability", self.probability)
            .with("impact", self.impact)
            .with("status", RiskStatus::Identified.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReview {
    pub id: i64,
    pub risk_id: i64,
    pub reviewer: String,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Risk register use cases.
pub trait RiskRepository {
    fn create_risk(&self, risk: &NewRisk) -> RepoResult<i64>;
    fn import_risks(&self, risks: &[NewRisk], batch_size: usize) -> RepoResult<Vec<i64>>;
    fn get_risk(&self, id: i64, include_deleted: bool) -> RepoResult<Option<Risk>>;
    fn list_by_status(&self, status: RiskStatus, limit: Option<u64>) -> RepoResult<Vec<Risk>>;
    fn update_status(&self, id: i64, status: RiskStatus) -> RepoResult<bool>;
    fn assign_owner(&self, id: i64, owner: &str) -> RepoResult<bool>;
    fn soft_delete_risk(&self, id: i64) -> RepoResult<bool>;
    fn restore_risk(&self, id: i64) -> RepoResult<bool>;
    fn add_review(&self, risk_id: i64, reviewer: &str, notes: Option<&str>) -> RepoResult<i64>;
    fn reviews_for(&self, risk_id: i64) -> RepoResult<Vec<RiskReview>>;
}

/// `RiskRepository` over the generic repository core.
pub struct SqlRiskRepository<'db> {
    risks: Repository<'db>,
    reviews: Repository<'db>,
}

impl<'db> SqlRiskRepository<'db> {
    pub fn try_new(db: &'db Database) -> RepoResult<Self> {
        Ok(Self {
            risks: Repository::try_new(db, &RISK_SCHEMA)?,
            reviews: Repository::try_new(db, &RISK_REVIEW_SCHEMA)?,
        })
    }

    /// Generic repository for the `risks` table.
    pub fn core(&self) -> &Repository<'db> {
        &self.risks
    }
}

impl RiskRepository for SqlRiskRepository<'_> {
    fn create_risk(&self, risk: &NewRisk) -> RepoResult<i64> {
        self.risks.create(&risk.to_record())
    }

    fn import_risks(&self, risks: &[NewRisk], batch_size: usize) -> RepoResult<Vec<i64>> {
        let records = risks.iter().map(NewRisk::to_record).collect::<Vec<_>>();
        self.risks.batch_create(&records, batch_size)
    }

    fn get_risk(&self, id: i64, include_deleted: bool) -> RepoResult<Option<Risk>> {
        self.risks
            .find_by_id_with(id, include_deleted)?
            .map(|record| parse_risk(&record))
            .transpose()
    }

    fn list_by_status(&self, status: RiskStatus, limit: Option<u64>) -> RepoResult<Vec<Risk>> {
        let options = FindOptions {
            limit,
            order_by: vec![OrderBy::asc("id")],
            ..FindOptions::default()
        };
        self.risks
            .find_by(&Record::new().with("status", status.as_str()), &options)?
            .iter()
            .map(parse_risk)
            .collect()
    }

    fn update_status(&self, id: i64, status: RiskStatus) -> RepoResult<bool> {
        self.risks
            .update(id, &Record::new().with("status", status.as_str()))
    }

    fn assign_owner(&self, id: i64, owner: &str) -> RepoResult<bool> {
        let options = WriteOptions {
            enforce_whitelist: false,
            extra_conditions: Record::new().with(DELETED_AT, Value::Null),
        };
        self.risks
            .update_with(id, &Record::new().with("owner", owner), &options)
    }

    fn soft_delete_risk(&self, id: i64) -> RepoResult<bool> {
        self.risks.delete_with(id, &DeleteOptions::soft())
    }

    fn restore_risk(&self, id: i64) -> RepoResult<bool> {
        self.risks.restore(id)
    }

    /// Records a review; an `identified` risk moves to `assessed` in the
    /// same transaction.
    fn add_review(&self, risk_id: i64, reviewer: &str, notes: Option<&str>) -> RepoResult<i64> {
        self.risks.transaction(|| {
            let risk = parse_risk(&self.risks.find_or_fail(risk_id)?)?;
            let review_id = self.reviews.create(
                &Record::new()
                    .with("risk_id", risk_id)
                    .with("reviewer", reviewer)
                    .with("notes", notes),
            )?;
            if risk.status == RiskStatus::Identified {
                self.update_status(risk_id, RiskStatus::Assessed)?;
            }
            info!(
                "event=risk_review_add module=repo status=ok risk_id={} review_id={}",
                risk_id, review_id
            );
            Ok(review_id)
        })
    }

    fn reviews_for(&self, risk_id: i64) -> RepoResult<Vec<RiskReview>> {
        let options = FindOptions {
            order_by: vec![OrderBy::asc("id")],
            ..FindOptions::default()
        };
        self.reviews
            .find_by(&Record::new().with("risk_id", risk_id), &options)?
            .iter()
            .map(parse_review)
            .collect()
    }
}

fn parse_risk(record: &Record) -> RepoResult<Risk> {
    let status_text = required_text(record, "status")?;
    let status = RiskStatus::parse(&status_text)
        .ok_or_else(|| RepoError::InvalidData(format!("unknown risk status `{status_text}`")))?;

    Ok(Risk {
        id: required_i64(record, "id")?,
        title: required_text(record, "title")?,
        description: optional_text(record, "description")?,
        probability: required_i64(record, "probability")?,
        impact: required_i64(record, "impact")?,
        status,
        owner: optional_text(record, "owner")?,
        created_at: required_text(record, CREATED_AT)?,
        updated_at: required_text(record, UPDATED_AT)?,
        deleted_at: optional_text(record, DELETED_AT)?,
    })
}

fn parse_review(record: &Record) -> RepoResult<RiskReview> {
    Ok(RiskReview {
        id: required_i64(record, "id")?,
        risk_id: required_i64(record, "risk_id")?,
        reviewer: required_text(record, "reviewer")?,
        notes: optional_text(record, "notes")?,
        created_at: required_text(record, CREATED_AT)?,
    })
}

fn required_i64(record: &Record, column: &str) -> RepoResult<i64> {
    record
        .get_i64(column)
        .ok_or_else(|| RepoError::InvalidData(format!("column `{column}` is not an integer")))
}

fn required_text(record: &Record, column: &str) -> RepoResult<String> {
    optional_text(record, column)?
        .ok_or_else(|| RepoError::InvalidData(format!("column `{column}` is null")))
}

fn optional_text(record: &Record, column: &str) -> RepoResult<Option<String>> {
    match record.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(text)) => Ok(Some(text.clone())),
        Some(other) => Err(RepoError::InvalidData(format!(
            "column `{column}` holds non-text value {}",
            other.to_log_string()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_risk, RiskStatus};
    use crate::model::{Record, Value};
    use crate::repo::RepoError;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            RiskStatus::Identified,
            RiskStatus::Assessed,
            RiskStatus::Mitigating,
            RiskStatus::Closed,
        ] {
            assert_eq!(RiskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RiskStatus::parse("open"), None);
    }

    #[test]
    fn parse_risk_rejects_unknown_status() {
        let record = Record::new()
            .with("id", 1)
            .with("title", "t")
            .with("probability", 2)
            .with("impact", 3)
            .with("status", "bogus")
            .with("created_at", "2026-01-01 00:00:00")
            .with("updated_at", "2026-01-01 00:00:00")
            .with("deleted_at", Value::Null);
        let err = parse_risk(&record).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(message) if message.contains("bogus")));
    }
}
