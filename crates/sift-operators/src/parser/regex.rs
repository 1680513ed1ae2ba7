//! Regex parser operator.
//!
//! Applies a compiled pattern to a text field; every named capture group
//! becomes a key in the parsed map.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sift_core::helper::{ParserConfig, ParserOperator};
use sift_core::{
    BuildContext, BuilderConfig, ConfigError, LifecycleError, Operator, ProcessingError,
    WiringError,
};
use sift_entry::{Entry, Map, Value};

/// Configuration for the `regex_parser` operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegexParserConfig {
    #[serde(flatten)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub regex: String,
}

impl BuilderConfig for RegexParserConfig {
    fn id(&self) -> String {
        self.parser.id()
    }

    fn operator_type(&self) -> &str {
        "regex_parser"
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        if self.regex.is_empty() {
            return Err(ConfigError::MissingRequiredField("regex"));
        }
        let regex = Regex::new(&self.regex).map_err(|err| ConfigError::InvalidValue {
            field: "regex".to_string(),
            reason: err.to_string(),
        })?;
        if regex.capture_names().flatten().next().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "regex".to_string(),
                reason: "pattern must contain at least one named capture group".to_string(),
            });
        }

        let operator: Arc<dyn Operator> = Arc::new(RegexParser {
            base: ParserOperator::from_config(&self.parser)?,
            regex,
        });
        Ok(operator)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// An operator that parses a text field with named capture groups.
pub struct RegexParser {
    base: ParserOperator,
    regex: Regex,
}

#[async_trait]
impl Operator for RegexParser {
    fn id(&self) -> String {
        self.base.id()
    }

    fn operator_type(&self) -> &str {
        "regex_parser"
    }

    fn can_process(&self) -> bool {
        true
    }

    fn can_output(&self) -> bool {
        true
    }

    fn output_ids(&self) -> Vec<String> {
        self.base.writer().output_ids()
    }

    fn set_outputs(&self, candidates: &[Arc<dyn Operator>]) -> Result<(), WiringError> {
        self.base.writer().resolve(&self.base.id(), candidates)
    }

    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.base.writer().outputs()
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn process(&self, entry: Entry) -> Result<(), ProcessingError> {
        self.base.process_with(entry, |value| {
            let text = value.as_text().ok_or_else(|| {
                ProcessingError::Parse(format!(
                    "value of type '{}' cannot be matched against a regex",
                    value.kind()
                ))
            })?;
            let captures = self.regex.captures(&text).ok_or_else(|| {
                ProcessingError::Parse("regex pattern does not match the value".to_string())
            })?;

            let mut map = Map::new();
            for name in self.regex.capture_names().flatten() {
                if let Some(matched) = captures.name(name) {
                    map.insert(name.to_string(), Value::from(matched.as_str()));
                }
            }
            Ok(Value::Map(map))
        })
    }
}
