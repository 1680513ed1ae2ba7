//! Standalone timestamp parser operator.
//!
//! Wraps the [`TimeParser`](sift_core::helper::TimeParser) helper as its own
//! pipeline node for sources whose structural parsing happens elsewhere.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::helper::{TimeParser, TimeParserConfig, TransformerConfig, TransformerOperator};
use sift_core::{
    BuildContext, BuilderConfig, ConfigError, LifecycleError, Operator, ProcessingError,
    WiringError,
};
use sift_entry::Entry;

/// Configuration for the `time_parser` operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeParserOperatorConfig {
    #[serde(flatten)]
    pub transformer: TransformerConfig,
    #[serde(flatten)]
    pub time: TimeParserConfig,
}

impl BuilderConfig for TimeParserOperatorConfig {
    fn id(&self) -> String {
        self.transformer.id()
    }

    fn operator_type(&self) -> &str {
        "time_parser"
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        let operator: Arc<dyn Operator> = Arc::new(TimeParserOperator {
            base: TransformerOperator::from_config(&self.transformer),
            time_parser: self.time.build()?,
        });
        Ok(operator)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// An operator that extracts the entry timestamp from a field.
pub struct TimeParserOperator {
    base: TransformerOperator,
    time_parser: TimeParser,
}

#[async_trait]
impl Operator for TimeParserOperator {
    fn id(&self) -> String {
        self.base.id()
    }

    fn operator_type(&self) -> &str {
        "time_parser"
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
        self.base
            .process_with(entry, |entry| self.time_parser.parse(entry))
    }
}
