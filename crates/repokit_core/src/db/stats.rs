//! Per-database statement counters.

use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Statement bucket used for statistics and logs.
///
/// Count/exists style reads are `Select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Display for StatementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running statement counters and cumulative execution time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    pub select: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
    pub total_time: Duration,
}

impl QueryStats {
    pub(crate) fn record(&mut self, kind: StatementKind, elapsed: Duration) {
        let counter = match kind {
            StatementKind::Select => &mut self.select,
            StatementKind::Insert => &mut self.insert,
            StatementKind::Update => &mut self.update,
            StatementKind::Delete => &mut self.delete,
        };
        *counter += 1;
        self.total_time += elapsed;
    }

    /// Total statements across all buckets.
    pub fn total(&self) -> u64 {
        self.select + self.insert + self.update + self.delete
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryStats, StatementKind};
    use std::time::Duration;

    #[test]
    fn record_increments_bucket_and_time() {
        let mut stats = QueryStats::default();
        stats.record(StatementKind::Select, Duration::from_millis(2));
        stats.record(StatementKind::Select, Duration::from_millis(3));
        stats.record(StatementKind::Delete, Duration::from_millis(1));

        assert_eq!(stats.select, 2);
        assert_eq!(stats.delete, 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.total_time, Duration::from_millis(6));
    }
}
