//! Handler configuration resolution.
//!
//! Every handler has process-wide settings (`enabled` plus a base `config`
//! table) and each rule may carry its own config for the handler. The two
//! are deep-merged, rule values winning, and then decoded into the
//! handler's typed configuration.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::config::HandlerSettings;
use crate::pipeline::{HandlerKind, PipelineError};

/// Deep-merge `overlay` onto `base`. Objects merge key by key; any other
/// overlay value (except `null`) replaces the base value.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            let mut merged = b.clone();
            for (key, value) in o {
                let next = match merged.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, Value::Null) => base.clone(),
        (_, other) => other.clone(),
    }
}

/// Fail with the "disabled" error unless the handler is enabled.
pub fn ensure_enabled(kind: HandlerKind, id: &str, settings: &HandlerSettings) -> Result<(), PipelineError> {
    if settings.enabled {
        Ok(())
    } else {
        Err(PipelineError::HandlerDisabled {
            kind,
            id: id.to_string(),
        })
    }
}

/// Merge the rule-level override onto the handler settings and decode it.
pub fn decode<T: DeserializeOwned>(
    kind: HandlerKind,
    id: &str,
    settings: &HandlerSettings,
    overlay: &Value,
) -> Result<T, PipelineError> {
    let merged = match merge(&settings.config, overlay) {
        Value::Null => Value::Object(Map::new()),
        v => v,
    };
    serde_json::from_value(merged).map_err(|e| PipelineError::HandlerMisconfigured {
        kind,
        id: id.to_string(),
        reason: e.to_string(),
    })
}
