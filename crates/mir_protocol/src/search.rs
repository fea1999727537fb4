//! Search filter expressions accepted by `POST <collection>/search`.
//!
//! A search body is a conjunction of `{fieldname, operator, value}` triples.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::ids::{MissionGuid, QueueEntryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">")]
    Gt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub fieldname: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl SearchFilter {
    pub fn eq(fieldname: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            fieldname: fieldname.into(),
            operator: FilterOperator::Eq,
            value: value.into(),
        }
    }

    pub fn gt(fieldname: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            fieldname: fieldname.into(),
            operator: FilterOperator::Gt,
            value: value.into(),
        }
    }

    /// `name = <name>`
    pub fn name_is(name: &str) -> Self {
        Self::eq("name", name)
    }

    /// `id > <checkpoint>`
    pub fn id_after(checkpoint: QueueEntryId) -> Self {
        Self::gt("id", checkpoint.as_u64())
    }

    /// `mission_id = <guid>`
    pub fn mission_is(guid: &MissionGuid) -> Self {
        Self::eq("mission_id", guid.as_str())
    }

    /// Evaluate this filter against a JSON record.
    ///
    /// Numbers and numeric strings compare numerically; anything else compares
    /// as text. A missing field never matches.
    pub fn matches(&self, record: &Value) -> bool {
        let Some(field) = record.get(&self.fieldname) else {
            return false;
        };
        match (self.operator, compare(field, &self.value)) {
            (FilterOperator::Eq, Some(Ordering::Equal)) => true,
            (FilterOperator::Gt, Some(Ordering::Greater)) => true,
            _ => false,
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l.partial_cmp(&r);
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Body of a search request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub filters: Vec<SearchFilter>,
}

impl SearchRequest {
    pub fn new(filters: Vec<SearchFilter>) -> Self {
        Self { filters }
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }
}
