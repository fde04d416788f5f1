//! Insertion-ordered row mapping.
//!
//! # Invariants
//! - Column names are unique; inserting an existing name replaces its value
//!   in place and keeps the original position.
//! - Records carry scalar values only, never relationship data.

use super::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One row (or write payload / condition set) keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Inserts or replaces a value, returning the previous one.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((column, value));
                None
            }
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(name, _)| name == column)?;
        Some(self.entries.remove(index).1)
    }

    /// Keeps only entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.entries.retain(|(name, value)| keep(name, value));
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders `{col=value, ...}` for logs and error context.
    pub(crate) fn describe(&self) -> String {
        let rendered = self
            .entries
            .iter()
            .map(|(name, value)| {
                if crate::sanitize::is_sensitive_key(name) {
                    format!("{name}={}", crate::sanitize::MASK)
                } else {
                    format!("{name}={}", value.to_log_string())
                }
            })
            .collect::<Vec<_>>();
        format!("{{{}}}", rendered.join(", "))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::Record;
    use crate::model::Value;

    #[test]
    fn insert_replaces_in_place_and_keeps_order() {
        let mut record = Record::new().with("a", 1).with("b", "two").with("c", 3.0);
        let previous = record.insert("b", "changed");

        assert_eq!(previous, Some(Value::from("two")));
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(record.get_str("b"), Some("changed"));
    }

    #[test]
    fn serializes_as_ordered_json_object() {
        let record = Record::new()
            .with("title", "X")
            .with("deleted_at", Value::Null)
            .with("impact", 5);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"title":"X","deleted_at":null,"impact":5}"#);
    }

    #[test]
    fn describe_masks_sensitive_columns() {
        let record = Record::new().with("api_token", "abc").with("name", "n");
        let described = record.describe();
        assert!(!described.contains("abc"));
        assert!(described.contains("name=\"n\""));
    }
}
