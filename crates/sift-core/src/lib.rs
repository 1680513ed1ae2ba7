//! Pipeline kernel for the sift log collection agent.
//!
//! The kernel binds operators together: a process-wide [`registry`] maps
//! operator types to builder factories, the [`config`] module decodes a
//! polymorphic operator graph from YAML or JSON, [`pipeline`] wires built
//! operators into a validated DAG and supervises their lifecycles, and the
//! [`helper`] modules carry the machinery every concrete operator inherits
//! (timestamp extraction, expression templates, fan-out dispatch, durable
//! offset storage).
//!
//! Concrete operators live in `sift-operators`; embedding hosts build a
//! pipeline with [`config::AgentConfig::build`] followed by
//! [`pipeline::Pipeline::new`].

pub mod config;
pub mod duration;
pub mod error;
pub mod helper;
pub mod operator;
pub mod persist;
pub mod pipeline;
pub mod registry;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{AgentConfig, OperatorConfig};
pub use duration::Duration;
pub use error::{ConfigError, LifecycleError, PersistError, ProcessingError, WiringError};
pub use operator::{BuildContext, BuilderConfig, Operator};
pub use persist::{Database, Persister};
pub use pipeline::Pipeline;
