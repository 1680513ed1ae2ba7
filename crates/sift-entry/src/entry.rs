//! The in-flight log record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::field::{Field, FieldError};
use crate::severity::Severity;
use crate::value::{Map, Value};

/// A flexible representation of log data associated with a timestamp.
///
/// Cloning an entry is a deep copy: tags, labels, and the record tree are
/// all duplicated, so a clone handed to one output can never be observed
/// mutating under another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    pub record: Value,
}

impl Entry {
    /// Creates an entry stamped with the current instant and a null record.
    pub fn new() -> Self {
        Entry {
            timestamp: Utc::now(),
            severity: Severity::default(),
            tags: Vec::new(),
            labels: HashMap::new(),
            record: Value::Null,
        }
    }

    /// Creates an entry with the supplied record, stamped with the current
    /// instant.
    pub fn from_record(record: Value) -> Self {
        let mut entry = Entry::new();
        entry.record = record;
        entry
    }

    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    /// Returns the value of a field, if present.
    pub fn get(&self, field: &Field) -> Option<std::borrow::Cow<'_, Value>> {
        field.get(self)
    }

    /// Sets the value of a field.
    pub fn set(&mut self, field: &Field, value: Value) -> Result<(), FieldError> {
        field.set(self, value)
    }

    /// Deletes a field, returning the removed value if it was present.
    pub fn delete(&mut self, field: &Field) -> Option<Value> {
        field.delete(self)
    }

    /// Reads the value of a field into a typed destination, performing the
    /// conversions the destination type supports.
    pub fn read<T: FromFieldValue>(&self, field: &Field) -> Result<T, FieldError> {
        let value = field.get(self).ok_or_else(|| FieldError::Missing {
            field: field.to_string(),
        })?;
        T::from_field_value(value.into_owned(), field)
    }
}

impl Default for Entry {
    fn default() -> Self {
        Entry::new()
    }
}

/// A destination type for [`Entry::read`].
pub trait FromFieldValue: Sized {
    fn from_field_value(value: Value, field: &Field) -> Result<Self, FieldError>;
}

impl FromFieldValue for Value {
    fn from_field_value(value: Value, _field: &Field) -> Result<Self, FieldError> {
        Ok(value)
    }
}

impl FromFieldValue for String {
    fn from_field_value(value: Value, field: &Field) -> Result<Self, FieldError> {
        match value.as_text() {
            Some(text) => Ok(text.into_owned()),
            None => Err(FieldError::InvalidCast {
                field: field.to_string(),
                kind: value.kind(),
                target: "string",
            }),
        }
    }
}

impl FromFieldValue for Map {
    fn from_field_value(value: Value, field: &Field) -> Result<Self, FieldError> {
        match value {
            Value::Map(map) => Ok(map),
            other => Err(FieldError::InvalidCast {
                field: field.to_string(),
                kind: other.kind(),
                target: "map",
            }),
        }
    }
}

impl FromFieldValue for HashMap<String, String> {
    fn from_field_value(value: Value, field: &Field) -> Result<Self, FieldError> {
        let map = match value {
            Value::Map(map) => map,
            other => {
                return Err(FieldError::InvalidCast {
                    field: field.to_string(),
                    kind: other.kind(),
                    target: "string map",
                })
            }
        };

        let mut out = HashMap::with_capacity(map.len());
        for (key, value) in map {
            match value.as_text() {
                Some(text) => {
                    out.insert(key, text.into_owned());
                }
                None => {
                    return Err(FieldError::NonStringMapValue {
                        field: field.to_string(),
                        key,
                    })
                }
            }
        }
        Ok(out)
    }
}
