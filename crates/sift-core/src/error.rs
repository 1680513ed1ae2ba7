//! Error taxonomy for the pipeline kernel.
//!
//! Build-time failures ([`ConfigError`], [`WiringError`]) abort pipeline
//! construction. [`LifecycleError`] aborts a start sequence. Runtime
//! per-entry failures ([`ProcessingError`]) are logged by the nearest
//! operator and the entry dropped; [`PersistError`] is logged and the flush
//! retried on the next tick. Nothing at runtime tears the pipeline down.

use sift_entry::FieldError;
use thiserror::Error;

/// Errors raised while decoding configuration or building operators.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field '{0}'")]
    MissingRequiredField(&'static str),

    #[error("non-string type '{0}'")]
    NonStringType(String),

    #[error("unsupported type '{0}'")]
    UnsupportedType(String),

    /// A structural decode failure, propagated verbatim from the decoder.
    #[error("{0}")]
    Malformed(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid time layout: {0}")]
    InvalidTimeLayout(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error(transparent)]
    InvalidField(#[from] FieldError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Malformed(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Malformed(err.to_string())
    }
}

/// Errors raised while composing built operators into a graph.
#[derive(Debug, Error)]
pub enum WiringError {
    #[error("operator with id '{0}' already exists in pipeline")]
    DuplicateId(String),

    #[error("operator '{from}' cannot be connected: output '{to}' does not exist in the pipeline")]
    OutputNotFound { from: String, to: String },

    #[error("operator '{from}' cannot be connected to '{to}': '{to}' cannot process entries")]
    NotAProcessor { from: String, to: String },

    #[error("operators '{from}' and '{to}' are already connected")]
    DuplicateEdge { from: String, to: String },

    #[error("pipeline has a circular dependency: {cycles}")]
    Cycle { cycles: String },
}

/// Errors raised while starting or stopping operators.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("operator '{id}' failed to start: {reason}")]
    Start { id: String, reason: String },

    #[error("operator '{id}' failed to stop: {reason}")]
    Stop { id: String, reason: String },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-entry runtime errors.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("operator '{0}' does not process entries")]
    CannotProcess(String),

    #[error("failed to parse entry: {0}")]
    Parse(String),

    #[error("failed to render expression: {0}")]
    Render(String),

    #[error("timestamp parse failed: {0}")]
    Time(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable store failures.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
