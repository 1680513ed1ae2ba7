//! Record restructuring operator.
//!
//! Applies an ordered list of ops to each entry: `add` (literal or
//! expression-template value), `remove`, `retain` (keep only the named
//! record fields), `move`, and `flatten` (splice a nested map's keys into
//! its parent). Ops are validated and compiled at build time and applied in
//! declaration order.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::helper::{ExprString, ExprStringConfig, TransformerConfig, TransformerOperator};
use sift_core::{
    BuildContext, BuilderConfig, ConfigError, LifecycleError, Operator, ProcessingError,
    WiringError,
};
use sift_entry::{Entry, Field, FieldError, Map, Value};

/// Configuration for the `restructure` operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestructureConfig {
    #[serde(flatten)]
    pub transformer: TransformerConfig,
    #[serde(default)]
    pub ops: Vec<OpConfig>,
}

/// One restructuring step, tagged by its op name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpConfig {
    Add(AddOpConfig),
    Remove(Field),
    Retain(Vec<Field>),
    Move(MoveOpConfig),
    Flatten(Field),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddOpConfig {
    pub field: Field,
    /// A literal value to write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// An expression template rendered against each entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_expr: Option<ExprStringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveOpConfig {
    pub from: Field,
    pub to: Field,
}

impl BuilderConfig for RestructureConfig {
    fn id(&self) -> String {
        self.transformer.id()
    }

    fn operator_type(&self) -> &str {
        "restructure"
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        let ops = self
            .ops
            .iter()
            .map(Op::compile)
            .collect::<Result<Vec<Op>, ConfigError>>()?;
        let operator: Arc<dyn Operator> = Arc::new(Restructure {
            base: TransformerOperator::from_config(&self.transformer),
            ops,
        });
        Ok(operator)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A compiled restructuring step.
enum Op {
    AddLiteral { field: Field, value: Value },
    AddExpr { field: Field, expr: ExprString },
    Remove(Field),
    Retain(Vec<Field>),
    Move { from: Field, to: Field },
    Flatten(Field),
}

impl Op {
    fn compile(config: &OpConfig) -> Result<Op, ConfigError> {
        match config {
            OpConfig::Add(add) => match (&add.value, &add.value_expr) {
                (Some(value), None) => Ok(Op::AddLiteral {
                    field: add.field.clone(),
                    value: Value::from(value.clone()),
                }),
                (None, Some(expr)) => Ok(Op::AddExpr {
                    field: add.field.clone(),
                    expr: expr.build()?,
                }),
                _ => Err(ConfigError::InvalidValue {
                    field: "add".to_string(),
                    reason: "exactly one of 'value' and 'value_expr' must be set".to_string(),
                }),
            },
            OpConfig::Remove(field) => Ok(Op::Remove(field.clone())),
            OpConfig::Retain(fields) => {
                for field in fields {
                    if matches!(field, Field::Label(_)) {
                        return Err(ConfigError::InvalidValue {
                            field: "retain".to_string(),
                            reason: "retain only applies to record fields".to_string(),
                        });
                    }
                }
                Ok(Op::Retain(fields.clone()))
            }
            OpConfig::Move(move_op) => Ok(Op::Move {
                from: move_op.from.clone(),
                to: move_op.to.clone(),
            }),
            OpConfig::Flatten(field) => match field {
                Field::Record(components) if !components.is_empty() => {
                    Ok(Op::Flatten(field.clone()))
                }
                _ => Err(ConfigError::InvalidValue {
                    field: "flatten".to_string(),
                    reason: "flatten requires a non-root record field".to_string(),
                }),
            },
        }
    }

    fn apply(&self, entry: &mut Entry) -> Result<(), ProcessingError> {
        match self {
            Op::AddLiteral { field, value } => {
                field.set(entry, value.clone())?;
                Ok(())
            }
            Op::AddExpr { field, expr } => {
                let rendered = expr.render(entry)?;
                field.set(entry, Value::String(rendered))?;
                Ok(())
            }
            Op::Remove(field) => {
                entry.delete(field);
                Ok(())
            }
            Op::Retain(fields) => {
                let mut retained = Entry {
                    record: Value::Map(Map::new()),
                    ..entry.clone()
                };
                for field in fields {
                    if let Some(value) = field.get(entry) {
                        field.set(&mut retained, value.into_owned())?;
                    }
                }
                entry.record = retained.record;
                Ok(())
            }
            Op::Move { from, to } => {
                let value = from.delete(entry).ok_or_else(|| FieldError::Missing {
                    field: from.to_string(),
                })?;
                to.set(entry, value)?;
                Ok(())
            }
            Op::Flatten(field) => {
                let value = field.delete(entry).ok_or_else(|| FieldError::Missing {
                    field: field.to_string(),
                })?;
                let Value::Map(map) = value else {
                    return Err(ProcessingError::Parse(format!(
                        "field {field} cannot be flattened because it is not a map"
                    )));
                };
                let Field::Record(components) = field else {
                    return Err(ProcessingError::Parse(
                        "flatten only applies to record fields".to_string(),
                    ));
                };
                let parent = &components[..components.len() - 1];
                for (key, value) in map {
                    let mut target = parent.to_vec();
                    target.push(key);
                    Field::Record(target).set(entry, value)?;
                }
                Ok(())
            }
        }
    }
}

/// An operator that reshapes entries with an ordered list of ops.
pub struct Restructure {
    base: TransformerOperator,
    ops: Vec<Op>,
}

#[async_trait]
impl Operator for Restructure {
    fn id(&self) -> String {
        self.base.id()
    }

    fn operator_type(&self) -> &str {
        "restructure"
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
        self.base.process_with(entry, |entry| {
            for op in &self.ops {
                op.apply(entry)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::testutil::{build_context, CaptureOperator};

    fn wired(yaml: &str) -> (Arc<dyn Operator>, Arc<CaptureOperator>) {
        crate::register_defaults();
        let config = sift_core::OperatorConfig::from_yaml(yaml).unwrap();
        let operator = config.build(&build_context()).unwrap();
        let capture = Arc::new(CaptureOperator::new("cap"));
        let candidates: Vec<Arc<dyn Operator>> = vec![capture.clone()];
        operator.set_outputs(&candidates).unwrap();
        (operator, capture)
    }

    fn record(json: &str) -> Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn add_literal_and_expression_values() {
        let (operator, capture) = wired(
            "id: r\ntype: restructure\noutput: cap\nops:\n- add:\n    field: static\n    value: fixed\n- add:\n    field: derived\n    value_expr: \"msg=EXPR(record.message)\"\n",
        );

        operator
            .process(Entry::from_record(record(r#"{"message":"hi"}"#)))
            .unwrap();

        let received = capture.received();
        assert_eq!(
            received[0].record,
            record(r#"{"message":"hi","static":"fixed","derived":"msg=hi"}"#)
        );
    }

    #[test]
    fn remove_and_retain() {
        let (operator, capture) = wired(
            "id: r\ntype: restructure\noutput: cap\nops:\n- remove: scratch\n- retain:\n  - keep_a\n  - keep_b\n",
        );

        operator
            .process(Entry::from_record(record(
                r#"{"scratch":"x","keep_a":1,"keep_b":2,"drop_me":3}"#,
            )))
            .unwrap();

        let received = capture.received();
        assert_eq!(received[0].record, record(r#"{"keep_a":1,"keep_b":2}"#));
    }

    #[test]
    fn move_between_record_and_labels() {
        let (operator, capture) = wired(
            "id: r\ntype: restructure\noutput: cap\nops:\n- move:\n    from: app\n    to: $labels.app\n",
        );

        operator
            .process(Entry::from_record(record(r#"{"app":"sift","msg":"m"}"#)))
            .unwrap();

        let received = capture.received();
        assert_eq!(received[0].record, record(r#"{"msg":"m"}"#));
        assert_eq!(received[0].labels.get("app").map(String::as_str), Some("sift"));
    }

    #[test]
    fn move_missing_field_is_an_error() {
        let (operator, capture) = wired(
            "id: r\ntype: restructure\noutput: cap\nops:\n- move:\n    from: ghost\n    to: dest\n",
        );

        assert!(operator.process(Entry::from_record(record("{}"))).is_err());
        assert!(capture.received().is_empty());
    }

    #[test]
    fn flatten_splices_nested_keys_into_the_parent() {
        let (operator, capture) = wired(
            "id: r\ntype: restructure\noutput: cap\nops:\n- flatten: nested\n",
        );

        operator
            .process(Entry::from_record(record(
                r#"{"top":"t","nested":{"a":1,"b":2}}"#,
            )))
            .unwrap();

        let received = capture.received();
        assert_eq!(received[0].record, record(r#"{"top":"t","a":1,"b":2}"#));
    }

    #[test]
    fn flatten_rejects_non_map_values_at_runtime() {
        let (operator, _capture) = wired(
            "id: r\ntype: restructure\noutput: cap\nops:\n- flatten: leaf\n",
        );
        let err = operator
            .process(Entry::from_record(record(r#"{"leaf":"scalar"}"#)))
            .unwrap_err();
        assert!(err.to_string().contains("not a map"));
    }

    #[test]
    fn add_requires_exactly_one_value_source() {
        crate::register_defaults();
        for ops in [
            "- add:\n    field: f\n",
            "- add:\n    field: f\n    value: a\n    value_expr: b\n",
        ] {
            let config = sift_core::OperatorConfig::from_yaml(&format!(
                "id: r\ntype: restructure\noutput: cap\nops:\n{ops}"
            ))
            .unwrap();
            let err = config.build(&build_context()).unwrap_err();
            assert!(err.to_string().contains("value"));
        }
    }

    #[test]
    fn flatten_rejects_the_record_root_at_build() {
        crate::register_defaults();
        let config = sift_core::OperatorConfig::from_yaml(
            "id: r\ntype: restructure\noutput: cap\nops:\n- flatten: \"$record\"\n",
        )
        .unwrap();
        assert!(config.build(&build_context()).is_err());
    }

    #[test]
    fn unknown_ops_fail_to_decode() {
        let result: Result<RestructureConfig, _> = serde_yaml::from_str(
            "id: r\ntype: restructure\noutput: cap\nops:\n- explode: everything\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn ops_apply_in_declaration_order() {
        let (operator, capture) = wired(
            "id: r\ntype: restructure\noutput: cap\nops:\n- add:\n    field: step\n    value: first\n- add:\n    field: step\n    value: second\n",
        );

        operator.process(Entry::from_record(record("{}"))).unwrap();
        assert_eq!(
            capture.received()[0].record,
            record(r#"{"step":"second"}"#)
        );
    }
}
