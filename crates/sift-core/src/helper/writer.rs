//! Fan-out dispatch to declared outputs.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use sift_entry::Entry;
use tracing::warn;

use crate::error::WiringError;
use crate::operator::Operator;

/// Declared downstream ids: a single id or a sequence of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputIds(pub Vec<String>);

impl OutputIds {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for OutputIds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.len() == 1 {
            serializer.serialize_str(&self.0[0])
        } else {
            let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
            for id in &self.0 {
                seq.serialize_element(id)?;
            }
            seq.end()
        }
    }
}

impl<'de> Deserialize<'de> for OutputIds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdsVisitor;

        impl<'de> Visitor<'de> for IdsVisitor {
            type Value = OutputIds;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an operator id or a sequence of operator ids")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<OutputIds, E> {
                Ok(OutputIds(vec![v.to_string()]))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<OutputIds, A::Error> {
                let mut ids = Vec::new();
                while let Some(id) = seq.next_element::<String>()? {
                    ids.push(id);
                }
                Ok(OutputIds(ids))
            }
        }

        deserializer.deserialize_any(IdsVisitor)
    }
}

/// The configuration shared by every emitting operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default, alias = "output")]
    pub outputs: OutputIds,
}

/// Runtime fan-out state: declared ids, and the operators they resolved to
/// after wiring. Dispatch follows declaration order; a downstream failure
/// is logged and does not abort the remaining dispatches.
#[derive(Debug)]
pub struct WriterOperator {
    output_ids: Vec<String>,
    outputs: RwLock<Vec<Arc<dyn Operator>>>,
}

impl WriterOperator {
    pub fn new(output_ids: Vec<String>) -> Self {
        WriterOperator {
            output_ids,
            outputs: RwLock::new(Vec::new()),
        }
    }

    pub fn from_config(config: &WriterConfig) -> Self {
        WriterOperator::new(config.outputs.0.clone())
    }

    pub fn output_ids(&self) -> Vec<String> {
        self.output_ids.clone()
    }

    /// Resolves declared ids against the pipeline's operator set. Assigned
    /// once at wiring; read-only thereafter.
    pub fn resolve(
        &self,
        operator_id: &str,
        candidates: &[Arc<dyn Operator>],
    ) -> Result<(), WiringError> {
        let mut resolved = Vec::with_capacity(self.output_ids.len());
        for output_id in &self.output_ids {
            let output = candidates
                .iter()
                .find(|candidate| candidate.id() == *output_id)
                .cloned()
                .ok_or_else(|| WiringError::OutputNotFound {
                    from: operator_id.to_string(),
                    to: output_id.clone(),
                })?;
            resolved.push(output);
        }
        *write_lock(&self.outputs) = resolved;
        Ok(())
    }

    pub fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        read_lock(&self.outputs).clone()
    }

    /// Dispatches the entry synchronously to every resolved output, in
    /// declaration order. The last output receives the entry without a copy.
    pub fn write(&self, entry: Entry) {
        let outputs = read_lock(&self.outputs);
        let Some((last, rest)) = outputs.split_last() else {
            return;
        };
        for output in rest {
            if let Err(err) = output.process(entry.clone()) {
                warn!(output_id = %output.id(), error = %err, "downstream operator failed");
            }
        }
        if let Err(err) = last.process(entry) {
            warn!(output_id = %last.id(), error = %err, "downstream operator failed");
        }
    }
}

fn read_lock(
    lock: &RwLock<Vec<Arc<dyn Operator>>>,
) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Operator>>> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock(
    lock: &RwLock<Vec<Arc<dyn Operator>>>,
) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn Operator>>> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{CaptureOperator, FailingOperator};
    use sift_entry::Value;

    #[test]
    fn output_ids_decode_from_string_or_sequence() {
        let config: WriterConfig = serde_yaml::from_str("output: stdout\n").unwrap();
        assert_eq!(config.outputs, OutputIds(vec!["stdout".to_string()]));

        let config: WriterConfig = serde_yaml::from_str("outputs: [a, b]\n").unwrap();
        assert_eq!(
            config.outputs,
            OutputIds(vec!["a".to_string(), "b".to_string()])
        );

        let config: WriterConfig = serde_json::from_str(r#"{"output":"stdout"}"#).unwrap();
        assert_eq!(config.outputs, OutputIds(vec!["stdout".to_string()]));
    }

    #[test]
    fn resolve_fails_on_unknown_id() {
        let writer = WriterOperator::new(vec!["missing".to_string()]);
        let candidates: Vec<Arc<dyn Operator>> = vec![Arc::new(CaptureOperator::new("present"))];
        let err = writer.resolve("me", &candidates).unwrap_err();
        assert!(err.to_string().contains("'missing'"));
        assert!(err.to_string().contains("'me'"));
    }

    #[test]
    fn write_dispatches_in_declaration_order() {
        let first = Arc::new(CaptureOperator::new("first"));
        let second = Arc::new(CaptureOperator::new("second"));
        let candidates: Vec<Arc<dyn Operator>> = vec![second.clone(), first.clone()];

        let writer = WriterOperator::new(vec!["first".to_string(), "second".to_string()]);
        writer.resolve("me", &candidates).unwrap();
        assert_eq!(writer.outputs()[0].id(), "first");
        assert_eq!(writer.outputs()[1].id(), "second");

        writer.write(Entry::from_record(Value::from("x")));
        assert_eq!(first.received().len(), 1);
        assert_eq!(second.received().len(), 1);
    }

    #[test]
    fn downstream_failure_does_not_abort_fanout() {
        let failing: Arc<dyn Operator> = Arc::new(FailingOperator::new("bad"));
        let capture = Arc::new(CaptureOperator::new("good"));
        let candidates: Vec<Arc<dyn Operator>> = vec![failing, capture.clone()];

        let writer = WriterOperator::new(vec!["bad".to_string(), "good".to_string()]);
        writer.resolve("me", &candidates).unwrap();

        writer.write(Entry::from_record(Value::from("x")));
        assert_eq!(capture.received().len(), 1);
    }

    #[test]
    fn write_without_outputs_is_a_no_op() {
        let writer = WriterOperator::new(Vec::new());
        writer.write(Entry::new());
    }
}
