//! 📡 Readers for what the cluster says it has.
//!
//! `GET /{index}/_settings` answers `{"orders":{"settings":{"index":{"number_of_shards":"5",...}}}}`.
//! Yes, the count is a string. No, nobody knows why. 🦆

use serde_json::{Value, json};

use super::{ModelError, count_at, lookup};

/// 🔢 Current shard count from a settings response.
pub fn current_shard_count(settings: &Value, index: &str) -> Result<u32, ModelError> {
    settings_count(settings, index, "number_of_shards")
}

/// 🔢 Current replica count from a settings response.
pub fn current_replica_count(settings: &Value, index: &str) -> Result<u32, ModelError> {
    settings_count(settings, index, "number_of_replicas")
}

fn settings_count(settings: &Value, index: &str, key: &str) -> Result<u32, ModelError> {
    count_at(
        lookup(settings, &[index, "settings", "index", key]),
        &format!("{index}.settings.index.{key}"),
    )
}

/// 🌳 Current property tree from an untyped mapping response, wrapped as `{"properties": ...}`.
pub fn current_properties(mapping: &Value, index: &str) -> Option<Value> {
    lookup(mapping, &[index, "mappings", "properties"])
        .map(|properties| json!({ "properties": properties.clone() }))
}
