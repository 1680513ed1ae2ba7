//! Identity fields shared by every operator configuration.

use serde::{Deserialize, Serialize};

/// The `id` and `type` fields common to all operator entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicConfig {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub operator_type: String,
}

impl BasicConfig {
    pub fn new(id: impl Into<String>, operator_type: impl Into<String>) -> Self {
        BasicConfig {
            id: id.into(),
            operator_type: operator_type.into(),
        }
    }

    /// The operator id; defaults to the type name when the document omits
    /// `id`.
    pub fn id(&self) -> String {
        if self.id.is_empty() {
            self.operator_type.clone()
        } else {
            self.id.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_defaults_to_type() {
        let basic: BasicConfig = serde_json::from_str(r#"{"type":"stdout"}"#).unwrap();
        assert_eq!(basic.id(), "stdout");

        let basic: BasicConfig = serde_json::from_str(r#"{"type":"stdout","id":"out"}"#).unwrap();
        assert_eq!(basic.id(), "out");
    }
}
