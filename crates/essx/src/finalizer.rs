//! 🔒 Finalization Controller — nobody leaves until the cleanup crew has been.
//!
//! Every desired object carries a lifecycle marker while it is alive. The marker
//! means "essx still has business here"; the host must not forget the object
//! until we take the marker off. Taking it off happens after a best-effort
//! remote delete, and only if the object opted in to that delete.
//!
//! Remote cleanup failures are logged, never fatal. A host record stuck forever
//! in "deleting" is worse than an orphaned index. 🦆

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::common::DesiredObject;
use crate::gateway::SchemaGateway;

/// 🚦 What the host tells us about an object's lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub deletion_requested: bool,
    pub marker_present: bool,
    /// 🗑️ Opt-in: also delete the remote object on deletion.
    pub delete_in_cluster: bool,
}

/// ✍️ What the host should do with the marker afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerAction {
    #[default]
    Keep,
    Add,
    Remove,
}

/// 🧭 Which path this pass takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerDecision {
    /// First sighting: register the marker, converge next time.
    Register,
    /// Marker in place, no deletion: converge as usual.
    Converge,
    /// Deletion with the marker still on: clean up, then release.
    Finalize { delete_in_cluster: bool },
    /// Deletion and the marker is already gone: nothing left for us.
    Released,
}

#[derive(Debug, Clone)]
pub struct FinalizationController {
    marker_name: String,
}

impl FinalizationController {
    pub fn new(marker_name: impl Into<String>) -> Self {
        Self {
            marker_name: marker_name.into(),
        }
    }

    pub fn marker_name(&self) -> &str {
        &self.marker_name
    }

    pub fn decide(&self, lifecycle: &Lifecycle) -> FinalizerDecision {
        match (lifecycle.deletion_requested, lifecycle.marker_present) {
            (false, false) => FinalizerDecision::Register,
            (false, true) => FinalizerDecision::Converge,
            (true, true) => FinalizerDecision::Finalize {
                delete_in_cluster: lifecycle.delete_in_cluster,
            },
            (true, false) => FinalizerDecision::Released,
        }
    }

    /// 🗑️ Best-effort remote delete of the object's counterpart.
    ///
    /// Returns `true` when the cluster no longer has the object as far as we
    /// know. Failures are logged and reported as `false`; either way the caller
    /// removes the marker.
    pub async fn cleanup<G: SchemaGateway + ?Sized>(&self, gateway: &G, object: &DesiredObject) -> bool {
        let name = object.name();
        let outcome = match object {
            DesiredObject::Index(_) => gateway.delete_index_if_present(name).await,
            DesiredObject::Template(_) => gateway.delete_template_if_present(name).await,
            DesiredObject::Pipeline(_) => gateway.delete_pipeline_if_present(name).await,
        };
        match outcome {
            Ok(None) => {
                info!(marker = %self.marker_name, "🗑️ remote object was already gone");
                true
            }
            Ok(Some(response)) if response.is_success() => {
                info!(marker = %self.marker_name, "🗑️ remote object deleted");
                true
            }
            Ok(Some(response)) => {
                warn!(
                    status = response.status,
                    body = %response.body,
                    "💀 remote delete was refused, releasing the marker anyway"
                );
                false
            }
            Err(e) => {
                error!(error = %e, "💀 remote delete failed, releasing the marker anyway");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{IndexSpec, PipelineSpec, TemplateSpec};
    use crate::gateway::{GatewayCall, InMemoryGateway, RemoteError, RemoteResponse};

    fn controller() -> FinalizationController {
        FinalizationController::new("finalizer.elastic.essx.io")
    }

    fn template(name: &str) -> DesiredObject {
        DesiredObject::Template(TemplateSpec {
            name: name.to_string(),
            connection: "main".to_string(),
            number_of_shards: 1,
            number_of_replicas: 1,
            order: None,
            model: r#"{"index_patterns":["x-*"]}"#.to_string(),
        })
    }

    #[test]
    fn the_one_where_every_lifecycle_corner_has_a_decision() {
        let c = controller();
        let lifecycle = |deletion_requested, marker_present| Lifecycle {
            deletion_requested,
            marker_present,
            delete_in_cluster: true,
        };
        assert_eq!(c.decide(&lifecycle(false, false)), FinalizerDecision::Register);
        assert_eq!(c.decide(&lifecycle(false, true)), FinalizerDecision::Converge);
        assert_eq!(
            c.decide(&lifecycle(true, true)),
            FinalizerDecision::Finalize {
                delete_in_cluster: true
            }
        );
        assert_eq!(c.decide(&lifecycle(true, false)), FinalizerDecision::Released);
    }

    #[tokio::test]
    async fn the_one_where_a_missing_template_costs_one_existence_check() {
        let gateway = InMemoryGateway::default();
        let done = controller().cleanup(&gateway, &template("ghost")).await;

        assert!(done);
        assert_eq!(
            gateway.calls().await,
            vec![GatewayCall::TemplateExists("ghost".to_string())]
        );
    }

    #[tokio::test]
    async fn the_one_where_an_existing_index_is_deleted() {
        let gateway = InMemoryGateway::default();
        gateway.seed_index("orders", 1, 1, None).await;
        let index = DesiredObject::Index(IndexSpec {
            name: "orders".to_string(),
            connection: "main".to_string(),
            number_of_shards: 1,
            number_of_replicas: 1,
            model: "{}".to_string(),
        });

        assert!(controller().cleanup(&gateway, &index).await);
        assert!(gateway.index("orders").await.is_none());
        assert_eq!(
            gateway.writes().await,
            vec![GatewayCall::DeleteIndex("orders".to_string())]
        );
    }

    #[tokio::test]
    async fn the_one_where_failures_are_logged_not_thrown() {
        let gateway = InMemoryGateway::default();
        gateway.seed_template("logs", "{}").await;
        gateway
            .script("delete_template", Ok(RemoteResponse::new(500, "boom")))
            .await;
        assert!(!controller().cleanup(&gateway, &template("logs")).await);

        let gateway = InMemoryGateway::default();
        gateway
            .script("delete_pipeline", Err(RemoteError::Transport("refused".into())))
            .await;
        let pipeline = DesiredObject::Pipeline(PipelineSpec {
            name: "p".to_string(),
            connection: "main".to_string(),
            model: "{}".to_string(),
        });
        assert!(!controller().cleanup(&gateway, &pipeline).await);
    }
}
