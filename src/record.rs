// src/record.rs
//! Loosely-typed records produced by sources.
//!
//! A `Record` always carries an `id`; everything else lives in an open map of
//! named fields (`text`, `title`, `name`, ...) whose shape depends on the source.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of a record.
///
/// Numeric ids (timeline posts) are ordered numerically; opaque ids (URLs,
/// device ids) are only ever compared by value in practice. Ordering between
/// the two kinds puts every numeric id below every text id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Num(u64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RecordId {
    fn from(n: u64) -> Self {
        Self::Num(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value when it is a JSON string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Field value rendered for humans: strings verbatim, `null`/missing as empty.
    pub fn display_field(&self, field: &str) -> String {
        match self.fields.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_ids_order_numerically() {
        assert!(RecordId::from(9) < RecordId::from(10));
        assert!(RecordId::from(u64::MAX) < RecordId::from("a"));
    }

    #[test]
    fn serializes_flat_with_id() {
        let r = Record::new(3).with("text", "video").with("n", 5);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, json!({"id": 3, "text": "video", "n": 5}));

        let back: Record = serde_json::from_value(json!({"id": "https://x/1", "title": "t"})).unwrap();
        assert_eq!(back.id, RecordId::from("https://x/1"));
        assert_eq!(back.get_str("title"), Some("t"));
    }

    #[test]
    fn display_field_handles_non_strings() {
        let r = Record::new(1).with("battery", 42).with("gone", Value::Null);
        assert_eq!(r.display_field("battery"), "42");
        assert_eq!(r.display_field("gone"), "");
        assert_eq!(r.display_field("missing"), "");
    }
}
