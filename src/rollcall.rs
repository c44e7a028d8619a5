// src/rollcall.rs
//! Roll call: line up an expected list of names against the records actually observed.
//!
//! Output always has one entry per expected name, in the expected order. Each
//! observed record can answer for at most one name; absentees get a synthetic
//! entry built from `{field: name}` plus caller-supplied defaults.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attendance {
    Present(Record),
    Absent(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollCallEntry {
    pub name: String,
    pub attendance: Attendance,
}

impl RollCallEntry {
    pub fn is_present(&self) -> bool {
        matches!(self.attendance, Attendance::Present(_))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        match &self.attendance {
            Attendance::Present(r) => r.get(field),
            Attendance::Absent(m) => m.get(field),
        }
    }

    /// Flat JSON object view, as it would be rendered or written to a sheet.
    pub fn to_value(&self) -> Value {
        match &self.attendance {
            Attendance::Present(r) => serde_json::to_value(r).unwrap_or(Value::Null),
            Attendance::Absent(m) => Value::Object(m.clone()),
        }
    }
}

/// Roll-call settings for one trawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollCallConfig {
    pub names: Vec<String>,
    pub attendee_field: String,
    /// Fields given to absentees, e.g. `{ battery = null }`.
    #[serde(default)]
    pub absent_defaults: Map<String, Value>,
    /// Field reported per entry in spreadsheet rows.
    pub value_field: Option<String>,
}

/// Align `attendees` to `expected_names`. O(names × attendees), both are small.
pub fn roll_call(
    expected_names: &[String],
    attendee_field: &str,
    absent_defaults: &Map<String, Value>,
    attendees: &[Record],
) -> Vec<RollCallEntry> {
    let mut pool: Vec<&Record> = attendees.iter().collect();
    expected_names
        .iter()
        .map(|name| {
            let found = pool
                .iter()
                .position(|r| r.get_str(attendee_field) == Some(name.as_str()));
            let attendance = match found {
                Some(idx) => Attendance::Present(pool.remove(idx).clone()),
                None => {
                    let mut m = Map::new();
                    m.insert(attendee_field.to_string(), Value::String(name.clone()));
                    for (k, v) in absent_defaults {
                        m.insert(k.clone(), v.clone());
                    }
                    Attendance::Absent(m)
                }
            };
            RollCallEntry {
                name: name.clone(),
                attendance,
            }
        })
        .collect()
}

impl RollCallConfig {
    pub fn reconcile(&self, attendees: &[Record]) -> Vec<RollCallEntry> {
        roll_call(&self.names, &self.attendee_field, &self.absent_defaults, attendees)
    }
}
