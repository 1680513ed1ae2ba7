//! Process-wide operator type registry.
//!
//! Maps an operator-type string to a factory that decodes a fresh builder
//! from a raw document. A factory (rather than a shared builder instance) is
//! required because configuration decoding instantiates one builder per
//! occurrence. The registry is append-only in normal operation: built-ins
//! register once at host startup, before any pipeline is built.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;

use crate::error::ConfigError;
use crate::operator::BuilderConfig;

type DecodeFn =
    Box<dyn Fn(serde_json::Value) -> Result<Box<dyn BuilderConfig>, ConfigError> + Send + Sync>;

static REGISTRY: LazyLock<RwLock<HashMap<String, DecodeFn>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn read() -> RwLockReadGuard<'static, HashMap<String, DecodeFn>> {
    match REGISTRY.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write() -> RwLockWriteGuard<'static, HashMap<String, DecodeFn>> {
    match REGISTRY.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Registers builder type `B` under `operator_type`, replacing any previous
/// registration for that type.
pub fn register<B>(operator_type: &str)
where
    B: BuilderConfig + DeserializeOwned + 'static,
{
    let decode: DecodeFn = Box::new(|raw| {
        serde_json::from_value::<B>(raw)
            .map(|builder| Box::new(builder) as Box<dyn BuilderConfig>)
            .map_err(|err| ConfigError::Malformed(err.to_string()))
    });
    write().insert(operator_type.to_string(), decode);
}

/// Whether an operator type has been registered.
pub fn is_defined(operator_type: &str) -> bool {
    read().contains_key(operator_type)
}

/// Decodes a raw document into a fresh builder of the registered type.
pub fn decode(
    operator_type: &str,
    raw: serde_json::Value,
) -> Result<Box<dyn BuilderConfig>, ConfigError> {
    let registry = read();
    let decode = registry
        .get(operator_type)
        .ok_or_else(|| ConfigError::UnsupportedType(operator_type.to_string()))?;
    decode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn unknown_types_are_not_defined() {
        assert!(!is_defined("registry_test_never_registered"));
    }

    #[test]
    fn register_then_decode() {
        testutil::register_noop("registry_test_noop");
        assert!(is_defined("registry_test_noop"));

        let raw = serde_json::json!({"id": "x", "type": "registry_test_noop"});
        let builder = decode("registry_test_noop", raw).unwrap();
        assert_eq!(builder.id(), "x");
        assert_eq!(builder.operator_type(), "registry_test_noop");
    }

    #[test]
    fn decode_unregistered_type_errors() {
        let err = decode("registry_test_missing", serde_json::json!({})).unwrap_err();
        assert!(err.to_string().contains("unsupported type"));
    }
}
