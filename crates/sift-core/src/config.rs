//! Polymorphic configuration decoding.
//!
//! An operator entry is an object whose `type` field selects the concrete
//! builder; the remaining fields decode into that builder's schema. Both
//! YAML and JSON entry points normalize into one `serde_json::Value`-based
//! decode path, so equivalent documents produce identical builders
//! regardless of format.

use std::fmt;
use std::sync::Arc;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::duration;
use crate::error::ConfigError;
use crate::operator::{BuildContext, BuilderConfig, Operator};
use crate::registry;

/// One decoded operator entry, wrapping the concrete builder selected by
/// the document's `type` tag.
pub struct OperatorConfig {
    builder: Box<dyn BuilderConfig>,
}

impl OperatorConfig {
    pub fn new(builder: Box<dyn BuilderConfig>) -> Self {
        OperatorConfig { builder }
    }

    pub fn builder(&self) -> &dyn BuilderConfig {
        self.builder.as_ref()
    }

    pub fn build(&self, context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        self.builder.build(context)
    }

    /// Decodes one operator entry from a pre-parsed document.
    pub fn from_value(raw: serde_json::Value) -> Result<Self, ConfigError> {
        let object = raw
            .as_object()
            .ok_or_else(|| ConfigError::Malformed("operator config must be an object".into()))?;

        let operator_type = match object.get("type") {
            None => return Err(ConfigError::MissingRequiredField("type")),
            Some(serde_json::Value::String(operator_type)) => operator_type.clone(),
            Some(other) => return Err(ConfigError::NonStringType(other.to_string())),
        };

        let builder = registry::decode(&operator_type, raw)?;
        Ok(OperatorConfig { builder })
    }

    /// Decodes one operator entry from YAML. Negative durations normalize
    /// to their absolute value on this path.
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(document)?;
        let raw = yaml_to_json(raw)?;
        let _normalize = duration::yaml_decode_scope();
        Self::from_value(raw)
    }

    /// Decodes one operator entry from JSON.
    pub fn from_json(document: &[u8]) -> Result<Self, ConfigError> {
        let raw: serde_json::Value = serde_json::from_slice(document)?;
        Self::from_value(raw)
    }
}

impl fmt::Debug for OperatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorConfig")
            .field("id", &self.builder.id())
            .field("type", &self.builder.operator_type())
            .finish()
    }
}

impl Serialize for OperatorConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.builder.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OperatorConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        OperatorConfig::from_value(raw).map_err(de::Error::custom)
    }
}

/// The top-level agent configuration: a sequence of operator entries.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// The operator graph. `plugins` is accepted as a legacy alias.
    #[serde(alias = "plugins")]
    pub pipeline: Vec<OperatorConfig>,
}

impl AgentConfig {
    /// Decodes a full configuration from YAML. Negative durations normalize
    /// to their absolute value on this path.
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(document)?;
        let raw = yaml_to_json(raw)?;
        let _normalize = duration::yaml_decode_scope();
        Ok(serde_json::from_value(raw)?)
    }

    pub fn from_json(document: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(document)?)
    }

    /// Builds every operator in declaration order.
    pub fn build(&self, context: &BuildContext) -> Result<Vec<Arc<dyn Operator>>, ConfigError> {
        self.pipeline
            .iter()
            .map(|config| config.build(context))
            .collect()
    }
}

/// Normalizes a YAML document into a JSON value tree. Scalar map keys that
/// are not strings (numbers, booleans) are stringified, matching what the
/// record model accepts.
fn yaml_to_json(value: serde_yaml::Value) -> Result<serde_json::Value, ConfigError> {
    Ok(match value {
        serde_yaml::Value::Null => serde_json::Value::Null,
        serde_yaml::Value::Bool(b) => serde_json::Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| ConfigError::Malformed("non-finite number".into()))?
            }
        }
        serde_yaml::Value::String(s) => serde_json::Value::String(s),
        serde_yaml::Value::Sequence(seq) => serde_json::Value::Array(
            seq.into_iter()
                .map(yaml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut object = serde_json::Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    other => {
                        return Err(ConfigError::Malformed(format!(
                            "unsupported map key: {other:?}"
                        )))
                    }
                };
                object.insert(key, yaml_to_json(value)?);
            }
            serde_json::Value::Object(object)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn register_plugin() {
        testutil::register_fake("plugin");
    }

    #[test]
    fn decodes_polymorphic_yaml() {
        register_plugin();
        let config = OperatorConfig::from_yaml("id: plugin\ntype: plugin\narray:\n- test\n")
            .expect("decode");

        assert_eq!(config.builder().id(), "plugin");
        assert_eq!(config.builder().operator_type(), "plugin");
        assert_eq!(
            config.builder().to_json(),
            serde_json::json!({"id": "plugin", "type": "plugin", "array": ["test"]})
        );
    }

    #[test]
    fn yaml_and_json_decode_identically() {
        register_plugin();
        let from_yaml =
            OperatorConfig::from_yaml("id: plugin\ntype: plugin\narray:\n- test\n").unwrap();
        let from_json =
            OperatorConfig::from_json(br#"{"id":"plugin","type":"plugin","array":["test"]}"#)
                .unwrap();
        assert_eq!(from_yaml.builder().to_json(), from_json.builder().to_json());
    }

    #[test]
    fn marshals_to_json() {
        register_plugin();
        let config =
            OperatorConfig::from_json(br#"{"id":"plugin","type":"plugin","array":["test"]}"#)
                .unwrap();
        let out = serde_json::to_string(&config).unwrap();
        assert_eq!(out, r#"{"id":"plugin","type":"plugin","array":["test"]}"#);
    }

    #[test]
    fn missing_type_errors() {
        let err = OperatorConfig::from_json(br#"{"id":"stdout"}"#).unwrap_err();
        assert!(err.to_string().contains("missing required field"));

        let err = OperatorConfig::from_yaml("id: plugin\n").unwrap_err();
        assert!(err.to_string().contains("missing required field"));
    }

    #[test]
    fn unknown_type_errors() {
        let err = OperatorConfig::from_json(br#"{"id":"stdout","type":"nonexist"}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported type"));
    }

    #[test]
    fn non_string_type_errors() {
        let err = OperatorConfig::from_yaml("id: plugin\ntype: 123\n").unwrap_err();
        assert!(err.to_string().contains("non-string type"));
    }

    #[test]
    fn type_specific_decode_errors_propagate() {
        register_plugin();
        let err =
            OperatorConfig::from_json(br#"{"id":"plugin","type":"plugin","array":"nonarray"}"#)
                .unwrap_err();
        assert!(err.to_string().contains("invalid type"));

        let err = OperatorConfig::from_yaml("id: plugin\ntype: plugin\narray: nonarray\n")
            .unwrap_err();
        assert!(err.to_string().contains("invalid type"));
    }

    #[test]
    fn invalid_documents_error() {
        assert!(OperatorConfig::from_json(b"{}}").is_err());
        assert!(OperatorConfig::from_yaml("-- - \\n||\\\\").is_err());
        assert!(OperatorConfig::from_json(b"[1,2]").is_err());
    }

    #[test]
    fn agent_config_accepts_pipeline_and_plugins_keys() {
        register_plugin();
        let a = AgentConfig::from_yaml("pipeline:\n- type: plugin\n").unwrap();
        let b = AgentConfig::from_yaml("plugins:\n- type: plugin\n").unwrap();
        assert_eq!(a.pipeline.len(), 1);
        assert_eq!(b.pipeline.len(), 1);
    }

    #[test]
    fn agent_config_from_json_matches_yaml() {
        register_plugin();
        let yaml = AgentConfig::from_yaml("pipeline:\n- type: plugin\n  array: [a, b]\n").unwrap();
        let json =
            AgentConfig::from_json(br#"{"pipeline":[{"type":"plugin","array":["a","b"]}]}"#)
                .unwrap();
        assert_eq!(
            serde_json::to_value(&yaml).unwrap(),
            serde_json::to_value(&json).unwrap()
        );
    }

    #[test]
    fn negative_durations_normalize_on_the_yaml_path_only() {
        register_plugin();

        let from_yaml = OperatorConfig::from_yaml("type: plugin\ntimeout: -30\n").unwrap();
        assert_eq!(
            from_yaml.builder().to_json()["timeout"],
            serde_json::json!("30s")
        );

        let from_json =
            OperatorConfig::from_json(br#"{"type":"plugin","timeout":-30}"#).unwrap();
        assert_eq!(
            from_json.builder().to_json()["timeout"],
            serde_json::json!("-30s")
        );
    }

    #[test]
    fn stringifies_scalar_yaml_keys() {
        let raw: serde_yaml::Value = serde_yaml::from_str("100: a\ntrue: b\n").unwrap();
        let json = yaml_to_json(raw).unwrap();
        assert_eq!(json, serde_json::json!({"100": "a", "true": "b"}));
    }
}
