//! Stored record and its API representation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// One stored entity.
///
/// `fields` are the columns a service recognizes (`name`, `userId`, ...);
/// `data` is the free-form JSON attachment the client sent alongside them.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: u64,
    pub fields: Map<String, Value>,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    /// API representation: attachment, overlaid by fields, id and timestamps.
    ///
    /// Recognized fields win over same-named attachment keys, so a stale
    /// `userId` inside `data` can never mask the stored column.
    pub fn to_dto(&self) -> Value {
        let mut dto = self.data.clone();
        for (key, value) in &self.fields {
            dto.insert(key.clone(), value.clone());
        }
        dto.insert("id".to_string(), Value::from(self.id));
        dto.insert("createdAt".to_string(), Value::String(timestamp(&self.created_at)));
        dto.insert("updatedAt".to_string(), Value::String(timestamp(&self.updated_at)));
        Value::Object(dto)
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Values for a record about to be created.
///
/// `unique` names fields whose value no other stored record may share; the
/// store checks them and inserts as one step.
#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    pub fields: Map<String, Value>,
    pub data: Map<String, Value>,
    pub unique: Vec<String>,
}

/// Changes to an existing record.
///
/// `fields` replace the named columns; `data` is merged key-by-key over the
/// existing attachment.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub fields: Map<String, Value>,
    pub data: Map<String, Value>,
}

/// Equality filter on recognized fields; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| record.fields.get(field) == Some(value))
    }
}
