//! Base for entry-producing operators.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sift_entry::{Entry, Value};

use crate::helper::base::BasicConfig;
use crate::helper::writer::{WriterConfig, WriterOperator};

/// Configuration shared by input operators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(flatten)]
    pub basic: BasicConfig,
    #[serde(flatten)]
    pub writer: WriterConfig,
    /// Labels attached to every entry this input produces.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl InputConfig {
    pub fn id(&self) -> String {
        self.basic.id()
    }
}

/// Runtime base for inputs: identity, static labels, and fan-out.
#[derive(Debug)]
pub struct InputOperator {
    id: String,
    labels: HashMap<String, String>,
    writer: WriterOperator,
}

impl InputOperator {
    pub fn from_config(config: &InputConfig) -> Self {
        InputOperator {
            id: config.id(),
            labels: config.labels.clone(),
            writer: WriterOperator::from_config(&config.writer),
        }
    }

    pub fn id(&self) -> String {
        self.id.clone()
    }

    pub fn writer(&self) -> &WriterOperator {
        &self.writer
    }

    /// Creates an entry for `record`, stamped with the current instant and
    /// carrying the input's configured labels.
    pub fn new_entry(&self, record: Value) -> Entry {
        let mut entry = Entry::from_record(record);
        for (key, value) in &self.labels {
            entry.add_label(key.clone(), value.clone());
        }
        entry
    }

    /// Forwards the entry to all resolved outputs.
    pub fn write(&self, entry: Entry) {
        self.writer.write(entry);
    }
}
