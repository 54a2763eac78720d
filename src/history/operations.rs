//! history::operations
//!
//! Field-level mutation records.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::core::value::AttributeValue;

/// What an operation does.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Overwrite the field
    Set { field: String, value: AttributeValue },
    /// Remove the field
    Unset { field: String },
    /// Add values to an array field
    Add { field: String, value: AttributeValue },
    /// Remove values from an array field
    Remove { field: String, value: AttributeValue },
    /// Mark the resource as deleted
    Delete,
}

/// An immutable, dated operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Url of the operation resource once persisted
    pub url: Option<String>,
    pub date: DateTime<Utc>,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(kind: OperationKind, date: DateTime<Utc>) -> Self {
        Self {
            url: None,
            date,
            kind,
        }
    }

    pub fn set(field: impl Into<String>, value: impl Into<AttributeValue>, date: DateTime<Utc>) -> Self {
        Self::new(
            OperationKind::Set {
                field: field.into(),
                value: value.into(),
            },
            date,
        )
    }

    pub fn unset(field: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self::new(OperationKind::Unset { field: field.into() }, date)
    }

    pub fn add(field: impl Into<String>, value: impl Into<AttributeValue>, date: DateTime<Utc>) -> Self {
        Self::new(
            OperationKind::Add {
                field: field.into(),
                value: value.into(),
            },
            date,
        )
    }

    pub fn remove(field: impl Into<String>, value: impl Into<AttributeValue>, date: DateTime<Utc>) -> Self {
        Self::new(
            OperationKind::Remove {
                field: field.into(),
                value: value.into(),
            },
            date,
        )
    }

    pub fn delete(date: DateTime<Utc>) -> Self {
        Self::new(OperationKind::Delete, date)
    }

    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::Set { field, .. }
            | OperationKind::Unset { field }
            | OperationKind::Add { field, .. }
            | OperationKind::Remove { field, .. } => Some(field),
            OperationKind::Delete => None,
        }
    }

    pub fn value(&self) -> Option<&AttributeValue> {
        match &self.kind {
            OperationKind::Set { value, .. }
            | OperationKind::Add { value, .. }
            | OperationKind::Remove { value, .. } => Some(value),
            OperationKind::Unset { .. } | OperationKind::Delete => None,
        }
    }

    /// Whether both operations have the same effect at the same date.
    pub fn same_effect(&self, other: &Operation) -> bool {
        self.date == other.date && self.kind == other.kind
    }

    /// Tie-break among operations with equal dates.
    fn rank(&self) -> u8 {
        match self.kind {
            OperationKind::Set { .. } => 0,
            OperationKind::Unset { .. } => 1,
            OperationKind::Add { .. } => 2,
            OperationKind::Remove { .. } => 3,
            OperationKind::Delete => 4,
        }
    }

    /// Total order used for replay: date, then kind, field and value.
    pub fn replay_order(&self, other: &Operation) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.rank().cmp(&other.rank()))
            .then_with(|| self.field().cmp(&other.field()))
            .then_with(|| {
                let value = |op: &Operation| op.value().map(|v| v.to_json().to_string());
                value(self).cmp(&value(other))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::now;
    use chrono::Duration;

    #[test]
    fn accessors() {
        let date = now();
        let op = Operation::add("friendUrls", "a", date);
        assert_eq!(op.field(), Some("friendUrls"));
        assert_eq!(op.value(), Some(&AttributeValue::from("a")));
        assert_eq!(Operation::delete(date).field(), None);
    }

    #[test]
    fn replay_order_is_total() {
        let date = now();
        let later = date + Duration::milliseconds(1);

        let mut ops = vec![
            Operation::remove("tags", "a", date),
            Operation::set("name", "B", later),
            Operation::add("tags", "a", date),
            Operation::set("name", "A", date),
        ];
        ops.sort_by(Operation::replay_order);

        assert_eq!(ops[0], Operation::set("name", "A", date));
        assert_eq!(ops[1], Operation::add("tags", "a", date));
        assert_eq!(ops[2], Operation::remove("tags", "a", date));
        assert_eq!(ops[3], Operation::set("name", "B", later));
    }
}
