//! Parse-and-restructure base.
//!
//! A parser reads `parse_from`, runs an operator-specific parse into a new
//! value, writes the result to `parse_to` (the record root by default), and
//! optionally applies an embedded [`TimeParser`](crate::helper::time::TimeParser)
//! against the freshly parsed output.

use serde::{Deserialize, Serialize};
use sift_entry::{Entry, Field, FieldError, Value};

use crate::error::{ConfigError, ProcessingError};
use crate::helper::time::{TimeParser, TimeParserConfig};
use crate::helper::transformer::{TransformerConfig, TransformerOperator};
use crate::helper::writer::WriterOperator;

/// Configuration shared by parser operators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(flatten)]
    pub transformer: TransformerConfig,
    /// The field holding the raw value to parse. Defaults to the record
    /// root.
    #[serde(default)]
    pub parse_from: Field,
    /// Where the parsed value is written. Defaults to the record root,
    /// replacing the record with the parsed structure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_to: Option<Field>,
    /// Keep the raw source field after a successful parse.
    #[serde(default)]
    pub preserve: bool,
    /// Optional timestamp extraction, run against the parsed output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeParserConfig>,
}

impl ParserConfig {
    pub fn id(&self) -> String {
        self.transformer.id()
    }
}

/// Runtime base for parser operators.
#[derive(Debug)]
pub struct ParserOperator {
    base: TransformerOperator,
    parse_from: Field,
    parse_to: Field,
    preserve: bool,
    time_parser: Option<TimeParser>,
}

impl ParserOperator {
    pub fn from_config(config: &ParserConfig) -> Result<Self, ConfigError> {
        let time_parser = match &config.timestamp {
            Some(time_config) if !time_config.is_zero() => Some(time_config.build()?),
            _ => None,
        };
        Ok(ParserOperator {
            base: TransformerOperator::from_config(&config.transformer),
            parse_from: config.parse_from.clone(),
            parse_to: config.parse_to.clone().unwrap_or_default(),
            preserve: config.preserve,
            time_parser,
        })
    }

    pub fn id(&self) -> String {
        self.base.id()
    }

    pub fn writer(&self) -> &WriterOperator {
        self.base.writer()
    }

    /// Runs `parse` on the source field, restructures the entry, applies
    /// the embedded time parser, and forwards the entry downstream.
    pub fn process_with<F>(&self, entry: Entry, parse: F) -> Result<(), ProcessingError>
    where
        F: FnOnce(&Value) -> Result<Value, ProcessingError>,
    {
        self.base.process_with(entry, |entry| {
            let source = self
                .parse_from
                .get(entry)
                .ok_or_else(|| FieldError::Missing {
                    field: self.parse_from.to_string(),
                })?
                .into_owned();

            let parsed = parse(&source)?;
            if !self.preserve {
                self.parse_from.delete(entry);
            }
            self.parse_to.set(entry, parsed).map_err(ProcessingError::Field)?;

            if let Some(time_parser) = &self.time_parser {
                time_parser.parse(entry)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::time::LayoutType;
    use crate::operator::Operator;
    use crate::testutil::CaptureOperator;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    fn config(yaml: &str) -> ParserConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn wired(config: &ParserConfig) -> (ParserOperator, Arc<CaptureOperator>) {
        let capture = Arc::new(CaptureOperator::new("cap"));
        let parser = ParserOperator::from_config(config).unwrap();
        let candidates: Vec<Arc<dyn Operator>> = vec![capture.clone()];
        parser.writer().resolve(&parser.id(), &candidates).unwrap();
        (parser, capture)
    }

    fn splitting_parse(value: &Value) -> Result<Value, ProcessingError> {
        let text = value
            .as_text()
            .ok_or_else(|| ProcessingError::Parse("not text".to_string()))?;
        let mut map = sift_entry::Map::new();
        for (i, part) in text.split(',').enumerate() {
            map.insert(format!("part{i}"), Value::from(part));
        }
        Ok(Value::Map(map))
    }

    #[test]
    fn parses_into_the_record_root_by_default() {
        let config = config("id: p\ntype: test_parser\noutput: cap\nparse_from: message\n");
        let (parser, capture) = wired(&config);

        let mut entry = Entry::new();
        Field::record(["message"])
            .set(&mut entry, Value::from("a,b"))
            .unwrap();
        parser.process_with(entry, splitting_parse).unwrap();

        let received = capture.received();
        assert_eq!(received.len(), 1);
        let expected: Value = serde_json::from_str(r#"{"part0":"a","part1":"b"}"#).unwrap();
        assert_eq!(received[0].record, expected);
    }

    #[test]
    fn preserve_keeps_the_source_field() {
        let config = config(
            "id: p\ntype: test_parser\noutput: cap\nparse_from: message\nparse_to: parsed\npreserve: true\n",
        );
        let (parser, capture) = wired(&config);

        let mut entry = Entry::new();
        Field::record(["message"])
            .set(&mut entry, Value::from("a"))
            .unwrap();
        parser.process_with(entry, splitting_parse).unwrap();

        let received = capture.received();
        let expected: Value =
            serde_json::from_str(r#"{"message":"a","parsed":{"part0":"a"}}"#).unwrap();
        assert_eq!(received[0].record, expected);
    }

    #[test]
    fn missing_source_field_drops_the_entry() {
        let config = config("id: p\ntype: test_parser\noutput: cap\nparse_from: message\n");
        let (parser, capture) = wired(&config);

        let result = parser.process_with(Entry::new(), splitting_parse);
        assert!(result.is_err());
        assert!(capture.received().is_empty());
    }

    #[test]
    fn embedded_time_parser_runs_against_parsed_output() {
        let config = ParserConfig {
            parse_from: Field::record(["message"]),
            timestamp: Some(TimeParserConfig {
                layout_type: LayoutType::Epoch,
                layout: "s".to_string(),
                parse_from: Field::record(["part0"]),
                preserve: false,
            }),
            ..config("id: p\ntype: test_parser\noutput: cap\n")
        };
        let (parser, capture) = wired(&config);

        let mut entry = Entry::new();
        Field::record(["message"])
            .set(&mut entry, Value::from("1136214245,rest"))
            .unwrap();
        parser.process_with(entry, splitting_parse).unwrap();

        let received = capture.received();
        assert_eq!(
            received[0].timestamp,
            DateTime::<Utc>::from_timestamp(1_136_214_245, 0).unwrap()
        );
        // The timestamp source was removed from the parsed output.
        let expected: Value = serde_json::from_str(r#"{"part1":"rest"}"#).unwrap();
        assert_eq!(received[0].record, expected);
    }
}
