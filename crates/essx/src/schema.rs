//! 📐 Schema Model — reading, shaping and merging Elasticsearch JSON bodies.
//!
//! 🧠 Three flavours of JSON pass through here:
//! - **desired models** (what the user wrote: `aliases`, `mappings`, `settings`, ...) → [`model`]
//! - **pipeline models** (`description` + `processors`) with their own rulebook → [`pipeline`]
//! - **remote responses** (what the cluster says it has right now) → [`remote`]
//!
//! Everything in here is pure. No sockets were harmed in the making of this module. 🦆

use thiserror::Error;

pub mod model;
pub mod pipeline;
pub mod remote;

pub use model::{
    LegacyTypeWrapping, compact_json, detect_legacy_type_wrapping, extract_properties,
    extract_replica_count, extract_shard_count, json_equal, merge_shards_and_replicas,
    validate_shape,
};
pub use remote::{current_properties, current_replica_count, current_shard_count};

/// 💀 Everything that can go wrong while reading a JSON body.
///
/// Callers branch on these: `NotFound` from a remote settings read is a very
/// different conversation from `InvalidJson` in a user's model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("💀 body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("💀 no value found at `{path}`")]
    NotFound { path: String },
    #[error("💀 value at `{path}` is not a non-negative integer: {value}")]
    NotAnInteger { path: String, value: String },
    #[error("💀 {0}")]
    Shape(String),
}

/// 🔧 Parse a body that must be a JSON object at the top level.
pub(crate) fn parse_object(
    body: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, ModelError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ModelError::InvalidJson(e.to_string()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ModelError::Shape(format!(
            "expected a JSON object at the top level, found {}",
            json_type_name(&other)
        ))),
    }
}

/// 🔢 Walk a dotted path through nested objects. No arrays, no wildcards, no regrets.
pub(crate) fn lookup<'a>(
    root: &'a serde_json::Value,
    segments: &[&str],
) -> Option<&'a serde_json::Value> {
    segments
        .iter()
        .try_fold(root, |current, segment| current.as_object()?.get(*segment))
}

/// 🔢 Read a count that might be a number or a numeric string. Elasticsearch
/// answers `"3"`, humans write `3`. Both mean three.
pub(crate) fn count_at(value: Option<&serde_json::Value>, path: &str) -> Result<u32, ModelError> {
    let not_an_integer = |raw: String| ModelError::NotAnInteger {
        path: path.to_string(),
        value: raw,
    };
    match value {
        None | Some(serde_json::Value::Null) => Err(ModelError::NotFound {
            path: path.to_string(),
        }),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| not_an_integer(n.to_string())),
        Some(serde_json::Value::String(s)) => {
            s.trim().parse::<u32>().map_err(|_| not_an_integer(s.clone()))
        }
        Some(other) => Err(not_an_integer(other.to_string())),
    }
}

pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
