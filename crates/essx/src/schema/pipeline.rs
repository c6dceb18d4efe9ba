//! 🚰 Ingest pipeline models.
//!
//! A pipeline is a description and a list of processors. Each processor is an
//! object with exactly the processor's name as its key. Typo `gorkk` and the
//! cluster will tell you about it eventually. We tell you now. 🦆

use serde_json::{Map, Value};

use super::{ModelError, json_type_name};

const PIPELINE_KEYS: &[&str] = &["description", "processors"];

/// 📋 Ingest processors the cluster ships with.
pub const KNOWN_PROCESSORS: &[&str] = &[
    "append",
    "attachment",
    "bytes",
    "circle",
    "community_id",
    "convert",
    "csv",
    "date",
    "date_index_name",
    "dissect",
    "dot_expander",
    "drop",
    "enrich",
    "fail",
    "fingerprint",
    "foreach",
    "geo_grid",
    "geoip",
    "grok",
    "gsub",
    "html_strip",
    "inference",
    "ip_location",
    "join",
    "json",
    "kv",
    "lowercase",
    "network_direction",
    "pipeline",
    "redact",
    "registered_domain",
    "remove",
    "rename",
    "reroute",
    "script",
    "set",
    "set_security_user",
    "sort",
    "split",
    "terminate",
    "trim",
    "uppercase",
    "uri_parts",
    "urldecode",
    "user_agent",
];

pub fn is_known_processor(name: &str) -> bool {
    KNOWN_PROCESSORS.contains(&name)
}

/// ✅ Validate a parsed pipeline model.
///
/// Rejects on the first problem found: stray top-level keys, a missing or
/// blank `description`, `processors` that is not an array, or a processor
/// entry that is not an object or names an unknown processor.
pub(crate) fn validate(root: &Map<String, Value>) -> Result<(), ModelError> {
    if let Some(stray) = root.keys().find(|k| !PIPELINE_KEYS.contains(&k.as_str())) {
        return Err(ModelError::Shape(format!(
            "Pipeline model should contain only fields from this list {PIPELINE_KEYS:?}, found `{stray}`"
        )));
    }

    match root.get("description") {
        None => {
            return Err(ModelError::Shape(
                "Pipeline model should contain required field description".to_string(),
            ));
        }
        Some(Value::String(description)) if !description.trim().is_empty() => {}
        Some(Value::String(_)) => {
            return Err(ModelError::Shape(
                "Pipeline description must not be blank".to_string(),
            ));
        }
        Some(other) => {
            return Err(ModelError::Shape(format!(
                "Pipeline description must be a string, found {}",
                json_type_name(other)
            )));
        }
    }

    let processors = match root.get("processors") {
        None => {
            return Err(ModelError::Shape(
                "Pipeline model should contain required field processors".to_string(),
            ));
        }
        Some(Value::Array(processors)) => processors,
        Some(other) => {
            return Err(ModelError::Shape(format!(
                "Pipeline processors must be an array, found {}",
                json_type_name(other)
            )));
        }
    };

    for (position, processor) in processors.iter().enumerate() {
        let Value::Object(entry) = processor else {
            return Err(ModelError::Shape(format!(
                "Pipeline processor #{position} must be an object, found {}",
                json_type_name(processor)
            )));
        };
        if let Some(unknown) = entry.keys().find(|k| !is_known_processor(k)) {
            return Err(ModelError::Shape(format!(
                "Pipeline processor #{position} uses unknown processor `{unknown}`"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::common::ObjectKind;
    use crate::schema::{ModelError, validate_shape};

    fn shape_error(body: &str) -> String {
        match validate_shape(body, ObjectKind::Pipeline) {
            Err(ModelError::Shape(msg)) => msg,
            other => panic!("💀 expected a shape error for {body}, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_a_tidy_pipeline_passes() {
        let body = r#"{
            "description": "parse access logs",
            "processors": [
                {"grok": {"field": "message", "patterns": ["%{COMMONAPACHELOG}"]}},
                {"set": {"field": "parsed", "value": true}},
                {"rename": {"field": "a", "target_field": "b"}}
            ]
        }"#;
        assert!(validate_shape(body, ObjectKind::Pipeline).is_ok());
    }

    #[test]
    fn the_one_where_description_and_processors_are_both_required() {
        assert!(shape_error(r#"{"processors":[]}"#).contains("description"));
        assert!(shape_error(r#"{"description":"x"}"#).contains("processors"));
        assert!(shape_error("{}").contains("description"));
    }

    #[test]
    fn the_one_where_a_whitespace_description_is_still_blank() {
        assert!(shape_error(r#"{"description":"   ","processors":[]}"#).contains("blank"));
        assert!(shape_error(r#"{"description":7,"processors":[]}"#).contains("string"));
    }

    #[test]
    fn the_one_where_processors_must_be_an_array() {
        assert!(shape_error(r#"{"description":"d","processors":{"set":{}}}"#).contains("array"));
    }

    #[test]
    fn the_one_where_the_typo_processor_gets_caught() {
        let msg = shape_error(r#"{"description":"d","processors":[{"set":{}},{"gorkk":{}}]}"#);
        assert!(msg.contains("gorkk"), "message was {msg}");
        assert!(msg.contains("#1"), "message was {msg}");
    }

    #[test]
    fn the_one_where_stray_top_level_keys_are_rejected() {
        assert!(shape_error(r#"{"description":"d","processors":[],"on_failure":[]}"#)
            .contains("on_failure"));
    }

    #[test]
    fn the_one_where_broken_json_is_an_invalid_json_error() {
        assert!(matches!(
            validate_shape("{", ObjectKind::Pipeline),
            Err(ModelError::InvalidJson(_))
        ));
    }
}
