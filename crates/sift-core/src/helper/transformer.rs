//! Transform-and-forward base.

use serde::{Deserialize, Serialize};
use sift_entry::Entry;
use tracing::warn;

use crate::error::ProcessingError;
use crate::helper::base::BasicConfig;
use crate::helper::writer::{WriterConfig, WriterOperator};

/// Configuration shared by operators that mutate entries and forward them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformerConfig {
    #[serde(flatten)]
    pub basic: BasicConfig,
    #[serde(flatten)]
    pub writer: WriterConfig,
}

impl TransformerConfig {
    pub fn id(&self) -> String {
        self.basic.id()
    }
}

/// Runtime base for transforming operators: identity plus fan-out.
///
/// A failed transform is logged with the operator id, the entry is dropped,
/// and the error returned to the caller; the pipeline keeps running.
#[derive(Debug)]
pub struct TransformerOperator {
    id: String,
    writer: WriterOperator,
}

impl TransformerOperator {
    pub fn from_config(config: &TransformerConfig) -> Self {
        TransformerOperator {
            id: config.id(),
            writer: WriterOperator::from_config(&config.writer),
        }
    }

    pub fn id(&self) -> String {
        self.id.clone()
    }

    pub fn writer(&self) -> &WriterOperator {
        &self.writer
    }

    /// Applies `transform` to the entry, then forwards it downstream.
    pub fn process_with<F>(&self, mut entry: Entry, transform: F) -> Result<(), ProcessingError>
    where
        F: FnOnce(&mut Entry) -> Result<(), ProcessingError>,
    {
        if let Err(err) = transform(&mut entry) {
            warn!(operator_id = %self.id, error = %err, "failed to process entry");
            return Err(err);
        }
        self.writer.write(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;
    use crate::testutil::CaptureOperator;
    use sift_entry::{Field, Value};
    use std::sync::Arc;

    fn transformer_to(capture: &Arc<CaptureOperator>) -> TransformerOperator {
        let config: TransformerConfig =
            serde_yaml::from_str("id: t\ntype: test\noutput: cap\n").unwrap();
        let transformer = TransformerOperator::from_config(&config);
        let candidates: Vec<Arc<dyn Operator>> = vec![capture.clone()];
        transformer.writer().resolve("t", &candidates).unwrap();
        transformer
    }

    #[test]
    fn forwards_transformed_entries() {
        let capture = Arc::new(CaptureOperator::new("cap"));
        let transformer = transformer_to(&capture);

        let entry = Entry::from_record(Value::from("before"));
        transformer
            .process_with(entry, |entry| {
                Field::root().set(entry, Value::from("after"))?;
                Ok(())
            })
            .unwrap();

        let received = capture.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].record, Value::from("after"));
    }

    #[test]
    fn drops_entries_on_transform_failure() {
        let capture = Arc::new(CaptureOperator::new("cap"));
        let transformer = transformer_to(&capture);

        let result = transformer.process_with(Entry::new(), |_entry| {
            Err(ProcessingError::Parse("boom".to_string()))
        });

        assert!(result.is_err());
        assert!(capture.received().is_empty());
    }
}
