//! Shared test scaffolding: fake builders, capture operators, and build
//! contexts backed by an ephemeral database.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_entry::Entry;

use crate::duration::Duration;
use crate::error::{ConfigError, LifecycleError, ProcessingError};
use crate::operator::{BuildContext, BuilderConfig, Operator};
use crate::persist::Database;
use crate::registry;

/// A build context backed by an in-memory database.
pub fn build_context() -> BuildContext {
    BuildContext::new(Database::ephemeral().expect("open ephemeral database"))
}

/// A minimal builder with an `array` field, mirroring the schema used by
/// the config decoding tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeBuilder {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub operator_type: String,
    #[serde(default)]
    pub array: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl BuilderConfig for FakeBuilder {
    fn id(&self) -> String {
        if self.id.is_empty() {
            self.operator_type.clone()
        } else {
            self.id.clone()
        }
    }

    fn operator_type(&self) -> &str {
        &self.operator_type
    }

    fn build(&self, _context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError> {
        Ok(Arc::new(CaptureOperator::new(self.id())))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Registers [`FakeBuilder`] under `operator_type`.
pub fn register_fake(operator_type: &str) {
    registry::register::<FakeBuilder>(operator_type);
}

/// Alias for tests that only care that the type exists.
pub fn register_noop(operator_type: &str) {
    register_fake(operator_type);
}

/// A terminal operator that records every entry it processes.
#[derive(Debug)]
pub struct CaptureOperator {
    id: String,
    entries: Mutex<Vec<Entry>>,
}

impl CaptureOperator {
    pub fn new(id: impl Into<String>) -> Self {
        CaptureOperator {
            id: id.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Entries processed so far.
    pub fn received(&self) -> Vec<Entry> {
        self.entries.lock().expect("capture lock").clone()
    }
}

#[async_trait]
impl Operator for CaptureOperator {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn operator_type(&self) -> &str {
        "capture"
    }

    fn can_process(&self) -> bool {
        true
    }

    fn can_output(&self) -> bool {
        false
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn process(&self, entry: Entry) -> Result<(), ProcessingError> {
        self.entries.lock().expect("capture lock").push(entry);
        Ok(())
    }
}

/// An operator that fails every `process` call, for downstream-error tests.
#[derive(Debug)]
pub struct FailingOperator {
    id: String,
}

impl FailingOperator {
    pub fn new(id: impl Into<String>) -> Self {
        FailingOperator { id: id.into() }
    }
}

#[async_trait]
impl Operator for FailingOperator {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn operator_type(&self) -> &str {
        "failing"
    }

    fn can_process(&self) -> bool {
        true
    }

    fn can_output(&self) -> bool {
        false
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        Ok(())
    }

    fn process(&self, _entry: Entry) -> Result<(), ProcessingError> {
        Err(ProcessingError::Parse("always fails".to_string()))
    }
}
