//! JSON parser operator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::helper::{ParserConfig, ParserOperator};
use sift_core::{
    BuildContext, BuilderConfig, ConfigError, LifecycleError, Operator, ProcessingError,
    WiringError,
};
use sift_entry::{Entry, Value};

/// Configuration for the `json_parser` operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonParserConfig {
    #[serde(flatten)]
    pub parser: ParserConfig,
}

impl BuilderConfig for JsonParserConfig {
    fn id(&self) -> String {
        self.parser.id()
    }

    fn operator_type(&self) -> &str {
        "json_parser"
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        let operator: Arc<dyn Operator> = Arc::new(JsonParser {
            base: ParserOperator::from_config(&self.parser)?,
        });
        Ok(operator)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// An operator that parses a string field as a JSON object.
pub struct JsonParser {
    base: ParserOperator,
}

#[async_trait]
impl Operator for JsonParser {
    fn id(&self) -> String {
        self.base.id()
    }

    fn operator_type(&self) -> &str {
        "json_parser"
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
        self.base.process_with(entry, parse_json)
    }
}

fn parse_json(value: &Value) -> Result<Value, ProcessingError> {
    let text = value.as_text().ok_or_else(|| {
        ProcessingError::Parse(format!(
            "value of type '{}' cannot be parsed as JSON",
            value.kind()
        ))
    })?;
    let parsed: serde_json::Value = serde_json::from_str(&text)
        .map_err(|err| ProcessingError::Parse(format!("failed to parse as JSON: {err}")))?;
    if !parsed.is_object() {
        return Err(ProcessingError::Parse(
            "parsed value is not a JSON object".to_string(),
        ));
    }
    Ok(Value::from(parsed))
}
