//! The operator contract.
//!
//! An operator is a named, typed pipeline node. Builders are the
//! deserialization targets decoded from configuration; `build` materializes
//! them into live operators against a [`BuildContext`].

use std::sync::Arc;

use async_trait::async_trait;
use sift_entry::Entry;

use crate::error::{ConfigError, LifecycleError, ProcessingError, WiringError};
use crate::persist::Database;

/// Dependencies passed into every builder's `build`.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The persister root. Operators derive their scoped stores from it.
    pub database: Database,
}

impl BuildContext {
    pub fn new(database: Database) -> Self {
        BuildContext { database }
    }
}

/// A live pipeline node.
///
/// Operators are constructed by a builder during pipeline build, live from
/// `start` to `stop`, and are never reused across pipelines. `stop` is
/// idempotent and returns only after every task the operator spawned has
/// exited. `process` consumes entries inline on the caller's task and must
/// not retain the entry past return without cloning it.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Unique id within a pipeline.
    fn id(&self) -> String;

    /// The registered operator kind.
    fn operator_type(&self) -> &str;

    /// Whether this operator accepts incoming entries.
    fn can_process(&self) -> bool;

    /// Whether this operator emits entries to declared outputs.
    fn can_output(&self) -> bool;

    /// Declared downstream operator ids, in dispatch order.
    fn output_ids(&self) -> Vec<String> {
        Vec::new()
    }

    /// Resolves declared output ids against the pipeline's operator set.
    /// Called once at wiring; a no-op for operators that cannot output.
    fn set_outputs(&self, _candidates: &[Arc<dyn Operator>]) -> Result<(), WiringError> {
        Ok(())
    }

    /// Resolved downstream operators, available after wiring.
    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        Vec::new()
    }

    async fn start(&self) -> Result<(), LifecycleError>;

    async fn stop(&self) -> Result<(), LifecycleError>;

    /// Consumes one entry synchronously.
    fn process(&self, entry: Entry) -> Result<(), ProcessingError>;
}

impl std::fmt::Debug for dyn Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operator({})", self.id())
    }
}

/// A deserialized operator configuration that can build a live operator.
pub trait BuilderConfig: Send + Sync {
    /// The operator id this builder will produce (defaults to the type name
    /// when the document omits `id`).
    fn id(&self) -> String;

    /// The registered operator kind.
    fn operator_type(&self) -> &str;

    /// Materializes the live operator.
    fn build(&self, context: &BuildContext) -> Result<Arc<dyn Operator>, ConfigError>;

    /// The builder's own document form, used to re-serialize configuration.
    fn to_json(&self) -> serde_json::Value;
}

impl std::fmt::Debug for dyn BuilderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuilderConfig({})", self.operator_type())
    }
}
