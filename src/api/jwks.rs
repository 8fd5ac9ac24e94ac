//! Public JSON Web Key Set.
//!
//! Keys are read from the configured JWKS file; private members and
//! symmetric keys never leave the process.

use std::fs;

use axum::{extract::State, Json};
use serde_json::{json, Map, Value};

use crate::http::AppState;

/// Members that only private or symmetric keys carry.
const PRIVATE_MEMBERS: [&str; 8] = ["d", "p", "q", "dp", "dq", "qi", "k", "oth"];

/// GET /.well-known/jwks.json
pub async fn public_keys(State(state): State<AppState>) -> Json<Value> {
    Json(state.load().jwks.clone())
}

/// The public part of `set`: symmetric keys are dropped and private
/// members removed from the rest.
pub fn public_key_set(set: &Value) -> Value {
    let keys: Vec<Value> = set
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_object)
                .filter(|key| key.get("kty").and_then(Value::as_str) != Some("oct"))
                .map(|key| {
                    let public: Map<String, Value> = key
                        .iter()
                        .filter(|(name, _)| !PRIVATE_MEMBERS.contains(&name.as_str()))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    Value::Object(public)
                })
                .collect()
        })
        .unwrap_or_default();
    json!({ "keys": keys })
}

/// Load the public key set from `path`. A missing path or an unreadable
/// file yields an empty set.
pub fn load_public_keys(path: Option<&str>) -> Value {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return json!({ "keys": [] });
    };
    let path = path.strip_prefix("file://").unwrap_or(path);
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|e| e.to_string()));
    match parsed {
        Ok(set) => public_key_set(&set),
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Unable to load JSON Web Key Set");
            json!({ "keys": [] })
        }
    }
}
