//! Path addressing into an entry.
//!
//! A field has one of two roots: the record (`$record`, `$`, or no prefix)
//! addressed by a `.`-separated path of map keys, or the labels map
//! (`$labels`) addressed by exactly one key.

use std::borrow::Cow;
use std::fmt;
use std::mem;
use std::str::FromStr;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::Entry;
use crate::value::{Map, Value};

const LABELS_PREFIX: &str = "$labels";
const RECORD_PREFIX: &str = "$record";
const ROOT_PREFIX: &str = "$";

/// Errors produced when addressing or reading entry fields.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field '{field}' is missing")]
    Missing { field: String },

    #[error("field '{field}' of type '{kind}' cannot be cast to '{target}'")]
    InvalidCast {
        field: String,
        kind: &'static str,
        target: &'static str,
    },

    #[error("value for key '{key}' in field '{field}' cannot be cast to a string")]
    NonStringMapValue { field: String, key: String },

    #[error("label values must be strings, got '{kind}'")]
    InvalidLabelValue { kind: &'static str },

    #[error("invalid field '{input}': {reason}")]
    InvalidSyntax { input: String, reason: String },
}

/// An addressable location within an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// A path of map keys into the record. An empty path is the record root.
    Record(Vec<String>),
    /// A single key into the labels map.
    Label(String),
}

impl Field {
    /// The record root.
    pub fn root() -> Self {
        Field::Record(Vec::new())
    }

    pub fn record<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Field::Record(components.into_iter().map(Into::into).collect())
    }

    pub fn label(key: impl Into<String>) -> Self {
        Field::Label(key.into())
    }

    /// Reads the addressed value. Record fields borrow from the entry;
    /// label values are materialized as string values.
    pub fn get<'a>(&self, entry: &'a Entry) -> Option<Cow<'a, Value>> {
        match self {
            Field::Record(components) => {
                let mut current = &entry.record;
                for component in components {
                    current = current.as_map()?.get(component)?;
                }
                Some(Cow::Borrowed(current))
            }
            Field::Label(key) => entry
                .labels
                .get(key)
                .map(|v| Cow::Owned(Value::String(v.clone()))),
        }
    }

    /// Writes `value` at the addressed location, creating intermediate maps
    /// as needed. Setting the record root replaces the record wholesale.
    pub fn set(&self, entry: &mut Entry, value: Value) -> Result<(), FieldError> {
        match self {
            Field::Record(components) => {
                let Some((last, parents)) = components.split_last() else {
                    entry.record = value;
                    return Ok(());
                };
                let mut current = ensure_map(&mut entry.record);
                for component in parents {
                    let slot = current
                        .entry(component.clone())
                        .or_insert_with(|| Value::Map(Map::new()));
                    current = ensure_map(slot);
                }
                current.insert(last.clone(), value);
                Ok(())
            }
            Field::Label(key) => match value.as_text() {
                Some(text) => {
                    entry.labels.insert(key.clone(), text.into_owned());
                    Ok(())
                }
                None => Err(FieldError::InvalidLabelValue { kind: value.kind() }),
            },
        }
    }

    /// Removes and returns the addressed value. Deleting the record root
    /// clears the record to an empty map and returns the prior record.
    pub fn delete(&self, entry: &mut Entry) -> Option<Value> {
        match self {
            Field::Record(components) => {
                let Some((last, parents)) = components.split_last() else {
                    return Some(mem::replace(&mut entry.record, Value::Map(Map::new())));
                };
                let mut current = &mut entry.record;
                for component in parents {
                    current = current.as_map_mut()?.get_mut(component)?;
                }
                current.as_map_mut()?.shift_remove(last)
            }
            Field::Label(key) => entry.labels.remove(key).map(Value::String),
        }
    }
}

/// Ensures the slot holds a map, replacing any other value, and returns it.
fn ensure_map(slot: &mut Value) -> &mut Map {
    if !matches!(slot, Value::Map(_)) {
        *slot = Value::Map(Map::new());
    }
    match slot {
        Value::Map(map) => map,
        _ => unreachable!(),
    }
}

impl Default for Field {
    fn default() -> Self {
        Field::root()
    }
}

impl FromStr for Field {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == ROOT_PREFIX || s == RECORD_PREFIX {
            return Ok(Field::root());
        }

        let mut components: Vec<&str> = s.split('.').collect();
        match components[0] {
            LABELS_PREFIX => {
                if components.len() != 2 {
                    return Err(FieldError::InvalidSyntax {
                        input: s.to_string(),
                        reason: "$labels must be followed by exactly one key".to_string(),
                    });
                }
                Ok(Field::Label(components[1].to_string()))
            }
            ROOT_PREFIX | RECORD_PREFIX => {
                components.remove(0);
                Ok(Field::record(components))
            }
            _ => Ok(Field::record(components)),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Record(components) if components.is_empty() => f.write_str(RECORD_PREFIX),
            Field::Record(components) => write!(f, "{RECORD_PREFIX}.{}", components.join(".")),
            Field::Label(key) => write!(f, "{LABELS_PREFIX}.{key}"),
        }
    }
}

impl Serialize for Field {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Field::Record(components) if components.len() == 1 => {
                serializer.serialize_str(&components[0])
            }
            Field::Record(components) => {
                let mut seq = serializer.serialize_seq(Some(components.len()))?;
                for component in components {
                    seq.serialize_element(component)?;
                }
                seq.end()
            }
            Field::Label(key) => serializer.serialize_str(&format!("{LABELS_PREFIX}.{key}")),
        }
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FieldVisitor;

        impl<'de> Visitor<'de> for FieldVisitor {
            type Value = Field;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a field path string or a sequence of components")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Field, E> {
                Field::from_str(v).map_err(de::Error::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Field, A::Error> {
                let mut components = Vec::new();
                while let Some(component) = seq.next_element::<String>()? {
                    components.push(component);
                }
                Ok(Field::Record(components))
            }
        }

        deserializer.deserialize_any(FieldVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_record() -> Value {
        serde_json::from_str(
            r#"{"testkey":"testval","testnested":{"testnestedkey":"testnestedval"}}"#,
        )
        .unwrap()
    }

    fn entry_with(record: Value) -> Entry {
        let mut entry = Entry::new();
        entry.record = record;
        entry
    }

    #[test]
    fn get_empty_selector_returns_record() {
        let entry = entry_with(standard_record());
        let got = Field::root().get(&entry).unwrap();
        assert_eq!(got.as_ref(), &standard_record());
    }

    #[test]
    fn get_string_field() {
        let entry = entry_with(standard_record());
        let got = Field::record(["testkey"]).get(&entry).unwrap();
        assert_eq!(got.as_ref(), &Value::from("testval"));
    }

    #[test]
    fn get_map_field() {
        let entry = entry_with(standard_record());
        let got = Field::record(["testnested"]).get(&entry).unwrap();
        let expected: Value =
            serde_json::from_str(r#"{"testnestedkey":"testnestedval"}"#).unwrap();
        assert_eq!(got.as_ref(), &expected);
    }

    #[test]
    fn get_nested_field() {
        let entry = entry_with(standard_record());
        let got = Field::record(["testnested", "testnestedkey"])
            .get(&entry)
            .unwrap();
        assert_eq!(got.as_ref(), &Value::from("testnestedval"));
    }

    #[test]
    fn get_missing_field() {
        let entry = entry_with(standard_record());
        assert!(Field::record(["invalid"]).get(&entry).is_none());
    }

    #[test]
    fn get_label() {
        let mut entry = Entry::new();
        entry.add_label("app", "sift");
        let got = Field::label("app").get(&entry).unwrap();
        assert_eq!(got.as_ref(), &Value::from("sift"));
        assert!(Field::label("other").get(&entry).is_none());
    }

    #[test]
    fn delete_leaf() {
        let mut entry = entry_with(
            serde_json::from_str::<Value>(r#"{"deletedKey":"deletedVal"}"#).unwrap(),
        );
        let removed = Field::record(["deletedKey"]).delete(&mut entry);
        assert_eq!(removed, Some(Value::from("deletedVal")));
        assert_eq!(entry.record, Value::Map(Map::new()));
    }

    #[test]
    fn delete_empty_selector_clears_record() {
        let mut entry = entry_with(standard_record());
        let removed = Field::root().delete(&mut entry);
        assert_eq!(removed, Some(standard_record()));
        assert_eq!(entry.record, Value::Map(Map::new()));
    }

    #[test]
    fn delete_missing_key() {
        let mut entry = entry_with(Value::Map(Map::new()));
        assert_eq!(Field::record(["deletedKey"]).delete(&mut entry), None);
        assert_eq!(entry.record, Value::Map(Map::new()));
    }

    #[test]
    fn delete_nested_key() {
        let mut entry = entry_with(standard_record());
        let removed = Field::record(["testnested", "testnestedkey"]).delete(&mut entry);
        assert_eq!(removed, Some(Value::from("testnestedval")));
        let expected: Value =
            serde_json::from_str(r#"{"testkey":"testval","testnested":{}}"#).unwrap();
        assert_eq!(entry.record, expected);
    }

    #[test]
    fn delete_nested_map() {
        let mut entry = entry_with(standard_record());
        let removed = Field::record(["testnested"]).delete(&mut entry);
        let expected_removed: Value =
            serde_json::from_str(r#"{"testnestedkey":"testnestedval"}"#).unwrap();
        assert_eq!(removed, Some(expected_removed));
        let expected: Value = serde_json::from_str(r#"{"testkey":"testval"}"#).unwrap();
        assert_eq!(entry.record, expected);
    }

    #[test]
    fn set_empty_selector_replaces_record() {
        let mut entry = entry_with(standard_record());
        Field::root().set(&mut entry, Value::from("inserted")).unwrap();
        assert_eq!(entry.record, Value::from("inserted"));
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut entry = entry_with(Value::Null);
        Field::record(["a", "b"])
            .set(&mut entry, Value::from("v"))
            .unwrap();
        let expected: Value = serde_json::from_str(r#"{"a":{"b":"v"}}"#).unwrap();
        assert_eq!(entry.record, expected);
    }

    #[test]
    fn set_into_nested_map() {
        let mut entry = entry_with(standard_record());
        Field::record(["testnested", "insertedKey"])
            .set(&mut entry, Value::from("insertedVal"))
            .unwrap();
        let expected: Value = serde_json::from_str(
            r#"{"testkey":"testval","testnested":{"testnestedkey":"testnestedval","insertedKey":"insertedVal"}}"#,
        )
        .unwrap();
        assert_eq!(entry.record, expected);
    }

    #[test]
    fn set_overwrites_nested_map() {
        let mut entry = entry_with(standard_record());
        Field::record(["testnested"])
            .set(&mut entry, Value::from("insertedVal"))
            .unwrap();
        let expected: Value =
            serde_json::from_str(r#"{"testkey":"testval","testnested":"insertedVal"}"#).unwrap();
        assert_eq!(entry.record, expected);
    }

    #[test]
    fn set_label_requires_string() {
        let mut entry = Entry::new();
        Field::label("app").set(&mut entry, Value::from("sift")).unwrap();
        assert_eq!(entry.labels.get("app").map(String::as_str), Some("sift"));

        let err = Field::label("app").set(&mut entry, Value::Int(1)).unwrap_err();
        assert!(err.to_string().contains("label values must be strings"));
    }

    #[test]
    fn from_str_forms() {
        assert_eq!("test".parse::<Field>().unwrap(), Field::record(["test"]));
        assert_eq!("$.test".parse::<Field>().unwrap(), Field::record(["test"]));
        assert_eq!(
            "$record.test".parse::<Field>().unwrap(),
            Field::record(["test"])
        );
        assert_eq!(
            "a.b.c".parse::<Field>().unwrap(),
            Field::record(["a", "b", "c"])
        );
        assert_eq!(
            "$labels.test".parse::<Field>().unwrap(),
            Field::label("test")
        );
        assert_eq!("$".parse::<Field>().unwrap(), Field::root());
        assert!("$labels.test.bar".parse::<Field>().is_err());
        assert!("$labels".parse::<Field>().is_err());
    }

    #[test]
    fn deserialize_string_and_sequence() {
        let f: Field = serde_json::from_str("\"message\"").unwrap();
        assert_eq!(f, Field::record(["message"]));

        let f: Field = serde_json::from_str(r#"["message","nested"]"#).unwrap();
        assert_eq!(f, Field::record(["message", "nested"]));

        let f: Field = serde_yaml::from_str("message").unwrap();
        assert_eq!(f, Field::record(["message"]));

        let f: Field = serde_yaml::from_str("[message, nested]").unwrap();
        assert_eq!(f, Field::record(["message", "nested"]));

        assert!(serde_json::from_str::<Field>("12").is_err());
    }

    #[test]
    fn serialize_single_component_as_string() {
        assert_eq!(
            serde_json::to_string(&Field::record(["message"])).unwrap(),
            "\"message\""
        );
        assert_eq!(
            serde_json::to_string(&Field::record(["message", "nested"])).unwrap(),
            r#"["message","nested"]"#
        );
        assert_eq!(
            serde_yaml::to_string(&Field::record(["message"])).unwrap(),
            "message\n"
        );
    }

    #[test]
    fn round_trips_both_formats() {
        for field in [
            Field::record(["one"]),
            Field::record(["one", "two"]),
            Field::label("key"),
        ] {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(serde_json::from_str::<Field>(&json).unwrap(), field);

            let yaml = serde_yaml::to_string(&field).unwrap();
            assert_eq!(serde_yaml::from_str::<Field>(&yaml).unwrap(), field);
        }
    }
}
