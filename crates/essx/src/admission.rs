//! 🛂 Admission — the checks an object must pass before it is allowed to exist.
//!
//! Defaulting stamps the object's shard and replica counts into the model so the
//! model is the single source of truth. Validation collects *every* complaint
//! rather than stopping at the first, because nobody enjoys fixing one typo per
//! round trip. 🦆

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::common::{DesiredObject, ObjectKind};
use crate::connection::EsConnection;
use crate::schema::{ModelError, compact_json, merge_shards_and_replicas, validate_shape};

pub const MIN_SHARDS: u32 = 1;
pub const MAX_SHARDS: u32 = 500;
pub const MIN_REPLICAS: u32 = 1;
pub const MAX_REPLICAS: u32 = 3;

/// 📋 One complaint about one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// 💀 All the reasons an object was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("💀 {kind} `{name}` rejected: {}", render_causes(.causes))]
pub struct AdmissionError {
    pub kind: ObjectKind,
    pub name: String,
    pub causes: Vec<FieldError>,
}

fn render_causes(causes: &[FieldError]) -> String {
    causes
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// 🔧 Merge the object's shard/replica counts into the model and compact it.
///
/// Pipelines have neither, so their model is only compacted.
pub fn default_model(object: &mut DesiredObject) -> Result<(), ModelError> {
    let defaulted = match object.shards_and_replicas() {
        Some((shards, replicas)) => merge_shards_and_replicas(object.model(), replicas, shards)?,
        None => compact_json(object.model())?,
    };
    debug!(name = object.name(), "🔧 model defaulted");
    *object.model_mut() = defaulted;
    Ok(())
}

/// ✅ Checks that do not need an older version of the object.
pub fn validate_create(object: &DesiredObject) -> Result<(), AdmissionError> {
    finish(object, create_causes(object))
}

/// ✅ Create checks plus the immutability rules.
///
/// Connections are compared only when both sides could be resolved.
pub fn validate_update(
    old: &DesiredObject,
    new: &DesiredObject,
    old_connection: Option<&EsConnection>,
    new_connection: Option<&EsConnection>,
) -> Result<(), AdmissionError> {
    let mut causes = create_causes(new);

    if old.name() != new.name() {
        causes.push(FieldError::new(
            "name",
            format!("cannot update name from \"{}\" to \"{}\"", old.name(), new.name()),
        ));
    }
    if let (DesiredObject::Index(old_spec), DesiredObject::Index(new_spec)) = (old, new) {
        if old_spec.number_of_shards != new_spec.number_of_shards {
            causes.push(FieldError::new(
                "number_of_shards",
                "cannot update number_of_shards setting for an Index",
            ));
        }
    }
    if let (Some(old_connection), Some(new_connection)) = (old_connection, new_connection) {
        causes.extend(validate_connection_update(old_connection, new_connection));
    }
    finish(new, causes)
}

/// 🔌 The cluster behind an object may not move. Credentials and scheme may.
pub fn validate_connection_update(old: &EsConnection, new: &EsConnection) -> Option<FieldError> {
    if old.same_endpoint(new) {
        return None;
    }
    Some(FieldError::new(
        "connection",
        format!(
            "cannot move from {}:{} to {}:{}",
            old.host, old.port, new.host, new.port
        ),
    ))
}

fn create_causes(object: &DesiredObject) -> Vec<FieldError> {
    let mut causes = Vec::new();

    if !is_valid_name(object.name()) {
        causes.push(FieldError::new(
            "name",
            format!("\"{}\" must match ^[a-z0-9-_.]+$", object.name()),
        ));
    }
    if let Some((shards, replicas)) = object.shards_and_replicas() {
        if !(MIN_SHARDS..=MAX_SHARDS).contains(&shards) {
            causes.push(FieldError::new(
                "number_of_shards",
                format!("{shards} is outside {MIN_SHARDS}..={MAX_SHARDS}"),
            ));
        }
        if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&replicas) {
            causes.push(FieldError::new(
                "number_of_replicas",
                format!("{replicas} is outside {MIN_REPLICAS}..={MAX_REPLICAS}"),
            ));
        }
    }
    if let Err(e) = validate_shape(object.model(), object.kind()) {
        causes.push(FieldError::new("model", e.to_string()));
    }
    causes
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

fn finish(object: &DesiredObject, causes: Vec<FieldError>) -> Result<(), AdmissionError> {
    if causes.is_empty() {
        return Ok(());
    }
    Err(AdmissionError {
        kind: object.kind(),
        name: object.name().to_string(),
        causes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{IndexSpec, PipelineSpec, TemplateSpec};

    fn index(name: &str, shards: u32, replicas: u32, model: &str) -> DesiredObject {
        DesiredObject::Index(IndexSpec {
            name: name.to_string(),
            connection: "main".to_string(),
            number_of_shards: shards,
            number_of_replicas: replicas,
            model: model.to_string(),
        })
    }

    fn fields(err: &AdmissionError) -> Vec<&str> {
        err.causes.iter().map(|c| c.field.as_str()).collect()
    }

    #[test]
    fn the_one_where_defaulting_stamps_counts_and_squeezes_whitespace() {
        let mut object = index("orders", 3, 2, "{\n  \"settings\": {\"override\": true}\n}");
        default_model(&mut object).expect("💀 defaulting should work");
        let model: serde_json::Value =
            serde_json::from_str(object.model()).expect("💀 defaulted model should parse");
        assert_eq!(
            model,
            serde_json::json!({"settings": {"override": true, "number_of_replicas": 2, "number_of_shards": 3}})
        );
        assert!(!object.model().contains('\n'));
    }

    #[test]
    fn the_one_where_pipelines_are_only_compacted() {
        let mut pipeline = DesiredObject::Pipeline(PipelineSpec {
            name: "p".to_string(),
            connection: "main".to_string(),
            model: "{ \"description\" : \"d\", \"processors\" : [] }".to_string(),
        });
        default_model(&mut pipeline).expect("💀 compaction should work");
        assert_eq!(pipeline.model(), r#"{"description":"d","processors":[]}"#);
    }

    #[test]
    fn the_one_where_defaulting_a_broken_model_leaves_it_alone() {
        let mut object = index("orders", 3, 2, "{oops");
        assert!(default_model(&mut object).is_err());
        assert_eq!(object.model(), "{oops");
    }

    #[test]
    fn the_one_where_a_clean_index_is_admitted() {
        assert_eq!(validate_create(&index("orders-v1.2_a", 5, 2, "{}")), Ok(()));
    }

    #[test]
    fn the_one_where_every_complaint_is_collected() {
        let err = validate_create(&index("Orders!", 0, 4, r#"{"index_patterns":[]}"#))
            .expect_err("💀 this object is wrong in four ways");
        assert_eq!(
            fields(&err),
            vec!["name", "number_of_shards", "number_of_replicas", "model"]
        );
        assert_eq!(err.kind, ObjectKind::Index);
        assert!(err.to_string().contains("Index `Orders!` rejected"));
    }

    #[test]
    fn the_one_where_range_edges_are_inclusive() {
        assert!(validate_create(&index("a", 1, 1, "{}")).is_ok());
        assert!(validate_create(&index("a", 500, 3, "{}")).is_ok());
        assert!(validate_create(&index("a", 501, 3, "{}")).is_err());
    }

    #[test]
    fn the_one_where_templates_need_patterns_at_the_door() {
        let template = DesiredObject::Template(TemplateSpec {
            name: "logs".to_string(),
            connection: "main".to_string(),
            number_of_shards: 1,
            number_of_replicas: 1,
            order: None,
            model: "{}".to_string(),
        });
        let err = validate_create(&template).expect_err("💀 index_patterns is required");
        assert_eq!(fields(&err), vec!["model"]);
    }

    #[test]
    fn the_one_where_names_and_shards_are_set_in_stone() {
        let old = index("orders", 5, 2, "{}");
        let renamed = index("orders-2", 5, 2, "{}");
        let reshard = index("orders", 6, 2, "{}");
        let more_replicas = index("orders", 5, 3, "{}");

        assert_eq!(
            fields(&validate_update(&old, &renamed, None, None).expect_err("💀 rename")),
            vec!["name"]
        );
        assert_eq!(
            fields(&validate_update(&old, &reshard, None, None).expect_err("💀 reshard")),
            vec!["number_of_shards"]
        );
        assert!(validate_update(&old, &more_replicas, None, None).is_ok());
    }

    #[test]
    fn the_one_where_template_shards_may_change() {
        let template = |shards| {
            DesiredObject::Template(TemplateSpec {
                name: "logs".to_string(),
                connection: "main".to_string(),
                number_of_shards: shards,
                number_of_replicas: 1,
                order: None,
                model: r#"{"index_patterns":["logs-*"]}"#.to_string(),
            })
        };
        assert!(validate_update(&template(1), &template(2), None, None).is_ok());
    }

    #[test]
    fn the_one_where_the_cluster_cannot_move_under_an_object() {
        let old = EsConnection::from_uri("http://a:b@myhost:9200").expect("💀 should parse");
        let rotated = EsConnection::from_uri("https://c:d@myhost:9200").expect("💀 should parse");
        let moved = EsConnection::from_uri("http://otherhost:9200").expect("💀 should parse");

        assert_eq!(validate_connection_update(&old, &rotated), None);
        let cause = validate_connection_update(&old, &moved).expect("💀 a move should be refused");
        assert_eq!(cause.field, "connection");

        let object = index("orders", 5, 2, "{}");
        let err = validate_update(&object, &object, Some(&old), Some(&moved))
            .expect_err("💀 move should fail the update");
        assert_eq!(fields(&err), vec!["connection"]);
    }
}
