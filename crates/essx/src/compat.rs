//! ⚖️ Compatibility Validator — may this mapping change ship without losing fields?
//!
//! 🎬 INT. ELASTICSEARCH CLUSTER — NIGHT
//!
//! A field called `id` has lived in `orders` for three years. Today a pull request
//! deletes it from the YAML. The cluster would happily ignore that. Dashboards would
//! not. This module is the bouncer who checks the guest list before anyone leaves.
//!
//! The rule is key-set only: every field in the old tree must still be in the new
//! tree, recursively through nested `properties`. A field changing type under the
//! same name is accepted here; the cluster gets the final word on that one.

use serde_json::Value;
use tracing::debug;

/// 🧱 Default recursion ceiling. Past this depth the update is treated as unsafe.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// ✅ `true` iff replacing `old` with `new` removes no field at any depth.
///
/// Both sides must be objects with a `properties` key, at every level where the
/// old side nests one. Trees deeper than `max_depth` fail closed.
pub fn is_safe_update(old: &Value, new: &Value, max_depth: usize) -> bool {
    safe_at_depth(old, new, 0, max_depth)
}

/// 📄 String flavour of [`is_safe_update`]. Unparseable input is never safe.
pub fn is_safe_update_str(old: &str, new: &str, max_depth: usize) -> bool {
    match (
        serde_json::from_str::<Value>(old),
        serde_json::from_str::<Value>(new),
    ) {
        (Ok(old), Ok(new)) => is_safe_update(&old, &new, max_depth),
        _ => false,
    }
}

fn safe_at_depth(old: &Value, new: &Value, depth: usize, max_depth: usize) -> bool {
    if depth >= max_depth {
        debug!(depth, "🧱 mapping nesting hit the depth ceiling, refusing the update");
        return false;
    }
    let (Some(old_fields), Some(new_fields)) = (
        old.get("properties").and_then(Value::as_object),
        new.get("properties").and_then(Value::as_object),
    ) else {
        return false;
    };

    old_fields.iter().all(|(field, old_definition)| {
        let Some(new_definition) = new_fields.get(field) else {
            debug!(field = %field, "🗑️ field would be removed by this update");
            return false;
        };
        if old_definition.get("properties").is_none() {
            return true;
        }
        safe_at_depth(old_definition, new_definition, depth + 1, max_depth)
    })
}
