//! Record trait and index types
//!
//! Anything stored in a [`Store`](crate::Store) implements [`Record`]: it
//! names its collection, exposes its id, and declares which fields should be
//! queryable through [`Filter`]s.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A persistable record
pub trait Record: Serialize + DeserializeOwned + Send + 'static {
    /// Unique id within the collection
    fn id(&self) -> &str;

    /// Last update timestamp (unix milliseconds)
    fn updated_at(&self) -> i64;

    /// Collection name (table prefix); lowercase alphanumeric + underscores
    fn collection_name() -> &'static str;

    /// Fields to index for list queries
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        HashMap::new()
    }
}

/// A value stored in a collection's index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl IndexValue {
    /// Text form used for index storage and comparison
    pub fn as_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// Comparison operator for a [`Filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
}

/// A single list-query predicate over an indexed field
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    /// Equality filter on an indexed field
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_value_as_text() {
        assert_eq!(IndexValue::String("active".into()).as_text(), "active");
        assert_eq!(IndexValue::Int(42).as_text(), "42");
        assert_eq!(IndexValue::Bool(true).as_text(), "true");
    }

    #[test]
    fn test_filter_eq() {
        let filter = Filter::eq("status", IndexValue::String("active".into()));
        assert_eq!(filter.field, "status");
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.value.as_text(), "active");
    }
}
