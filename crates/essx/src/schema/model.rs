//! 📦 Desired models: the JSON bodies users hand us for indices and templates.
//!
//! "It's just JSON," they said. Then someone wrapped their mapping in `_doc`
//! because a blog post from 2017 told them to. 🦆

use serde_json::{Map, Value, json};

use super::{ModelError, count_at, lookup, parse_object, pipeline};
use crate::common::ObjectKind;

const INDEX_KEYS: &[&str] = &["aliases", "mappings", "settings"];
const TEMPLATE_KEYS: &[&str] = &["aliases", "mappings", "settings", "index_patterns", "version"];

/// 🔢 `settings.number_of_shards` from a desired model.
pub fn extract_shard_count(body: &str) -> Result<u32, ModelError> {
    settings_count(body, "number_of_shards")
}

/// 🔢 `settings.number_of_replicas` from a desired model.
pub fn extract_replica_count(body: &str) -> Result<u32, ModelError> {
    settings_count(body, "number_of_replicas")
}

fn settings_count(body: &str, key: &str) -> Result<u32, ModelError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| ModelError::InvalidJson(e.to_string()))?;
    count_at(
        lookup(&root, &["settings", key]),
        &format!("settings.{key}"),
    )
}

/// 🏷️ Is the mapping wrapped in a legacy type key like `_doc`?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyTypeWrapping {
    /// `{"mappings": {"_doc": {"properties": ...}}}`
    Present,
    /// `{"mappings": {"properties": ...}}`
    Absent,
    /// No mapping section, or an empty one. Let the cluster decide.
    Indeterminate,
}

impl LegacyTypeWrapping {
    /// 📡 Value for the `include_type_name` flag. `None` means "don't send it".
    pub fn include_type_name(self) -> Option<bool> {
        match self {
            LegacyTypeWrapping::Present => Some(true),
            LegacyTypeWrapping::Absent => Some(false),
            LegacyTypeWrapping::Indeterminate => None,
        }
    }
}

/// 🔍 Look at `mappings` and guess whether it speaks the old typed dialect.
///
/// A literal `properties` key at the top of `mappings` means untyped, even when
/// siblings like `dynamic` sit next to it. Malformed bodies are indeterminate.
pub fn detect_legacy_type_wrapping(body: &str) -> LegacyTypeWrapping {
    let Ok(root) = serde_json::from_str::<Value>(body) else {
        return LegacyTypeWrapping::Indeterminate;
    };
    match root.get("mappings").and_then(Value::as_object) {
        None => LegacyTypeWrapping::Indeterminate,
        Some(mappings) if mappings.is_empty() => LegacyTypeWrapping::Indeterminate,
        Some(mappings) if mappings.contains_key("properties") => LegacyTypeWrapping::Absent,
        Some(_) => LegacyTypeWrapping::Present,
    }
}

/// 🌳 The desired property tree, wrapped as `{"properties": ...}`.
///
/// Typed mappings are unwrapped one level first. `None` when there is no
/// mapping section, it is empty, or the body does not parse.
pub fn extract_properties(body: &str) -> Option<Value> {
    let root: Value = serde_json::from_str(body).ok()?;
    let mappings = root.get("mappings")?.as_object()?;
    if mappings.is_empty() {
        return None;
    }
    let properties = match mappings.get("properties") {
        Some(untyped) => untyped,
        None => mappings
            .values()
            .find_map(|type_body| type_body.get("properties"))?,
    };
    Some(json!({ "properties": properties.clone() }))
}

/// ✅ Check a model's top-level shape for its kind.
///
/// Index: only `aliases`, `mappings`, `settings`. Template: those plus
/// `index_patterns` (required) and `version`. Pipeline: see [`pipeline::validate`].
pub fn validate_shape(body: &str, kind: ObjectKind) -> Result<(), ModelError> {
    let root = parse_object(body).map_err(|e| match e {
        ModelError::InvalidJson(detail) => {
            ModelError::InvalidJson(format!("{kind} model: {detail}"))
        }
        other => other,
    })?;

    let (allowed, required): (&[&str], &[&str]) = match kind {
        ObjectKind::Index => (INDEX_KEYS, &[]),
        ObjectKind::Template => (TEMPLATE_KEYS, &["index_patterns"]),
        ObjectKind::Pipeline => return pipeline::validate(&root),
    };

    if let Some(stray) = root.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ModelError::Shape(format!(
            "{kind} model should contain only fields from this list {allowed:?}, found `{stray}`"
        )));
    }
    if let Some(missing) = required.iter().find(|k| !root.contains_key(**k)) {
        return Err(ModelError::Shape(format!(
            "{kind} model should contain required field {missing}"
        )));
    }
    Ok(())
}

/// 🔧 Stamp `settings.number_of_replicas` and `settings.number_of_shards` into a model.
///
/// Existing values are overwritten, other settings keys survive, and a missing
/// `settings` object is created. Returns compact JSON.
pub fn merge_shards_and_replicas(
    body: &str,
    replicas: u32,
    shards: u32,
) -> Result<String, ModelError> {
    let mut root = parse_object(body)?;
    let settings = root
        .entry("settings")
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(settings) = settings else {
        return Err(ModelError::Shape(
            "`settings` must be a JSON object".to_string(),
        ));
    };
    settings.insert("number_of_replicas".to_string(), json!(replicas));
    settings.insert("number_of_shards".to_string(), json!(shards));
    serde_json::to_string(&Value::Object(root)).map_err(|e| ModelError::InvalidJson(e.to_string()))
}

/// 🗜️ Re-serialize a JSON body with all the whitespace squeezed out.
pub fn compact_json(body: &str) -> Result<String, ModelError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ModelError::InvalidJson(e.to_string()))?;
    serde_json::to_string(&value).map_err(|e| ModelError::InvalidJson(e.to_string()))
}

/// ⚖️ Structural JSON equality.
///
/// Key order never matters. Numbers compare by value, so the `100` a user
/// wrote and the `100.0` a cluster echoes back are the same number.
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}
