//! 🎬 Reconciler — the front door the host knocks on.
//!
//! The host says: "here is the desired object, its resolved connection, what you
//! told me last time, and where it is in its lifecycle." We answer with the status
//! to persist (if it changed), when to look again, and what to do with the marker.
//!
//! Finalization runs first. Convergence only runs for live objects that already
//! carry their marker. Everything else is bookkeeping. 🦆

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, error, info, info_span};

use crate::app_config::RuntimeConfig;
use crate::common::{ConvergenceState, DesiredObject, ObservedStatus};
use crate::connection::{ConnectionError, EsConnection};
use crate::engine::ConvergenceEngine;
use crate::finalizer::{FinalizationController, FinalizerDecision, Lifecycle, MarkerAction};
use crate::gateway::GatewayConnector;

/// ⏰ When the host should invoke us again for this object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecheckHint {
    #[default]
    None,
    Short,
    Long,
}

impl RecheckHint {
    pub fn for_state(state: ConvergenceState) -> Self {
        match state {
            ConvergenceState::Created => RecheckHint::None,
            ConvergenceState::Retry => RecheckHint::Short,
            ConvergenceState::Error => RecheckHint::Long,
        }
    }

    pub fn delay(self, runtime: &RuntimeConfig) -> Option<Duration> {
        match self {
            RecheckHint::None => None,
            RecheckHint::Short => Some(runtime.retry_interval()),
            RecheckHint::Long => Some(runtime.error_interval()),
        }
    }
}

/// 📥 One reconciliation request from the host.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub object: DesiredObject,
    /// 🔌 The connection as the host resolved it, or why it could not.
    pub connection: Result<EsConnection, ConnectionError>,
    pub prior: Option<ObservedStatus>,
    pub lifecycle: Lifecycle,
}

/// 📤 What the host should persist and schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// `Some` only when the host must overwrite its stored status.
    pub status: Option<ObservedStatus>,
    pub recheck: RecheckHint,
    pub marker: MarkerAction,
}

#[derive(Debug)]
pub struct Reconciler<C: GatewayConnector> {
    runtime: RuntimeConfig,
    connector: C,
    finalizer: FinalizationController,
}

impl<C: GatewayConnector> Reconciler<C> {
    pub fn new(runtime: RuntimeConfig, connector: C) -> Self {
        let finalizer = FinalizationController::new(runtime.finalizer_name.clone());
        Self {
            runtime,
            connector,
            finalizer,
        }
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn marker_name(&self) -> &str {
        self.finalizer.marker_name()
    }

    /// 🚀 One pass for one object.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> ReconcileOutcome {
        let span = info_span!(
            "reconcile",
            kind = %request.object.kind(),
            name = %request.object.name()
        );
        self.reconcile_inner(request).instrument(span).await
    }

    async fn reconcile_inner(&self, request: &ReconcileRequest) -> ReconcileOutcome {
        match self.finalizer.decide(&request.lifecycle) {
            FinalizerDecision::Register => {
                info!(marker = %self.marker_name(), "🔒 registering lifecycle marker");
                ReconcileOutcome {
                    marker: MarkerAction::Add,
                    ..ReconcileOutcome::default()
                }
            }
            FinalizerDecision::Released => ReconcileOutcome::default(),
            FinalizerDecision::Finalize { delete_in_cluster } => {
                if delete_in_cluster {
                    self.cleanup_remote(request).await;
                } else {
                    info!("🗑️ remote cleanup not requested, leaving the cluster as is");
                }
                info!(marker = %self.marker_name(), "🔓 removing lifecycle marker");
                ReconcileOutcome {
                    marker: MarkerAction::Remove,
                    ..ReconcileOutcome::default()
                }
            }
            FinalizerDecision::Converge => {
                let next = self.converge(request).await;
                let recheck = RecheckHint::for_state(next.state);
                info!(status = %next.state, code = ?next.code, "🏁 convergence pass finished");
                ReconcileOutcome {
                    status: next.supersedes(request.prior.as_ref()).then_some(next),
                    recheck,
                    marker: MarkerAction::Keep,
                }
            }
        }
    }

    async fn converge(&self, request: &ReconcileRequest) -> ObservedStatus {
        let connection = match &request.connection {
            Ok(connection) => connection,
            Err(e) => return ObservedStatus::error(e.to_string()),
        };
        match self.connector.connect(connection).await {
            Ok(gateway) => {
                ConvergenceEngine::new(&gateway)
                    .with_max_mapping_depth(self.runtime.max_mapping_depth)
                    .converge(&request.object)
                    .await
            }
            Err(e) => {
                error!(cluster = %connection, error = %e, "💀 could not connect to cluster");
                e.to_status()
            }
        }
    }

    async fn cleanup_remote(&self, request: &ReconcileRequest) {
        let connection = match &request.connection {
            Ok(connection) => connection,
            Err(e) => {
                error!(error = %e, "💀 cannot clean up remotely without a connection");
                return;
            }
        };
        match self.connector.connect(connection).await {
            Ok(gateway) => {
                self.finalizer.cleanup(&gateway, &request.object).await;
            }
            Err(e) => {
                error!(cluster = %connection, error = %e, "💀 could not connect for remote cleanup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::IndexSpec;
    use crate::gateway::{ConnectError, GatewayCall, InMemoryConnector, InMemoryGateway, RemoteError};

    fn orders(replicas: u32) -> DesiredObject {
        DesiredObject::Index(IndexSpec {
            name: "orders".to_string(),
            connection: "main".to_string(),
            number_of_shards: 5,
            number_of_replicas: replicas,
            model: format!(
                r#"{{"settings":{{"number_of_shards":5,"number_of_replicas":{replicas}}},"mappings":{{"properties":{{"id":{{"type":"keyword"}}}}}}}}"#
            ),
        })
    }

    fn request(object: DesiredObject, lifecycle: Lifecycle) -> ReconcileRequest {
        ReconcileRequest {
            object,
            connection: EsConnection::from_uri("http://localhost:9200"),
            prior: None,
            lifecycle,
        }
    }

    fn live() -> Lifecycle {
        Lifecycle {
            deletion_requested: false,
            marker_present: true,
            delete_in_cluster: false,
        }
    }

    fn reconciler(connector: InMemoryConnector) -> Reconciler<InMemoryConnector> {
        Reconciler::new(RuntimeConfig::default(), connector)
    }

    #[tokio::test]
    async fn the_one_where_the_first_pass_only_registers_the_marker() {
        let connector = InMemoryConnector::default();
        let outcome = reconciler(connector.clone())
            .reconcile(&request(orders(2), Lifecycle::default()))
            .await;

        assert_eq!(outcome.marker, MarkerAction::Add);
        assert_eq!(outcome.status, None);
        assert!(connector.gateway().calls().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_live_object_converges_and_reports() {
        let connector = InMemoryConnector::default();
        let outcome = reconciler(connector.clone())
            .reconcile(&request(orders(2), live()))
            .await;

        assert_eq!(outcome.status, Some(ObservedStatus::created(Some(200), r#"{"acknowledged":true}"#)));
        assert_eq!(outcome.recheck, RecheckHint::None);
        assert_eq!(outcome.marker, MarkerAction::Keep);
    }

    #[tokio::test]
    async fn the_one_where_a_stable_created_is_not_rewritten() {
        let connector = InMemoryConnector::default();
        connector.gateway().seed_index("orders", 5, 2, Some(serde_json::json!({"properties": {"id": {"type": "keyword"}}}))).await;
        let mut req = request(orders(2), live());
        req.prior = Some(ObservedStatus::created(Some(200), r#"{"acknowledged":true}"#));

        let outcome = reconciler(connector).reconcile(&req).await;
        assert_eq!(outcome.status, None);
        assert_eq!(outcome.recheck, RecheckHint::None);
    }

    #[tokio::test]
    async fn the_one_where_an_unreachable_cluster_means_retry_soon() {
        let connector = InMemoryConnector::failing(ConnectError::Unreachable(
            RemoteError::Transport("connection refused".into()),
        ));
        let r = reconciler(connector);
        let outcome = r.reconcile(&request(orders(2), live())).await;

        let status = outcome.status.expect("💀 a first failure must be written");
        assert_eq!(status.state, ConvergenceState::Retry);
        assert_eq!(outcome.recheck, RecheckHint::Short);
        assert_eq!(outcome.recheck.delay(r.runtime()), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn the_one_where_a_refused_login_is_a_long_wait() {
        let connector = InMemoryConnector::failing(ConnectError::Unreachable(RemoteError::Status {
            code: 401,
            body: "security_exception".into(),
        }));
        let r = reconciler(connector);
        let outcome = r.reconcile(&request(orders(2), live())).await;

        let status = outcome.status.expect("💀 a first failure must be written");
        assert_eq!(status.state, ConvergenceState::Error);
        assert_eq!(status.code, Some(401));
        assert_eq!(outcome.recheck, RecheckHint::Long);
    }

    #[tokio::test]
    async fn the_one_where_a_bad_connection_is_a_long_wait() {
        let mut req = request(orders(2), live());
        req.connection = EsConnection::from_uri("myhost:9200");
        let r = reconciler(InMemoryConnector::default());
        let outcome = r.reconcile(&req).await;

        assert_eq!(outcome.status.map(|s| s.state), Some(ConvergenceState::Error));
        assert_eq!(outcome.recheck, RecheckHint::Long);
        assert_eq!(outcome.recheck.delay(r.runtime()), Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn the_one_where_deletion_cleans_up_when_asked() {
        let connector = InMemoryConnector::default();
        connector.gateway().seed_index("orders", 5, 2, None).await;
        let lifecycle = Lifecycle {
            deletion_requested: true,
            marker_present: true,
            delete_in_cluster: true,
        };

        let outcome = reconciler(connector.clone())
            .reconcile(&request(orders(2), lifecycle))
            .await;

        assert_eq!(outcome.marker, MarkerAction::Remove);
        assert_eq!(outcome.status, None);
        assert!(connector.gateway().index("orders").await.is_none());
    }

    #[tokio::test]
    async fn the_one_where_deletion_without_opt_in_leaves_the_cluster_alone() {
        let connector = InMemoryConnector::default();
        connector.gateway().seed_index("orders", 5, 2, None).await;
        let lifecycle = Lifecycle {
            deletion_requested: true,
            marker_present: true,
            delete_in_cluster: false,
        };

        let outcome = reconciler(connector.clone())
            .reconcile(&request(orders(2), lifecycle))
            .await;

        assert_eq!(outcome.marker, MarkerAction::Remove);
        assert!(connector.gateway().calls().await.is_empty());
        assert!(connector.gateway().index("orders").await.is_some());
    }

    #[tokio::test]
    async fn the_one_where_a_dead_cluster_does_not_pin_the_marker() {
        let connector = InMemoryConnector::failing(ConnectError::Unreachable(
            RemoteError::Timeout(Duration::from_secs(10)),
        ));
        let lifecycle = Lifecycle {
            deletion_requested: true,
            marker_present: true,
            delete_in_cluster: true,
        };
        let outcome = reconciler(connector)
            .reconcile(&request(orders(2), lifecycle))
            .await;
        assert_eq!(outcome.marker, MarkerAction::Remove);
    }

    #[tokio::test]
    async fn the_one_where_a_released_object_is_left_in_peace() {
        let connector = InMemoryConnector::default();
        let lifecycle = Lifecycle {
            deletion_requested: true,
            marker_present: false,
            delete_in_cluster: true,
        };
        let outcome = reconciler(connector.clone())
            .reconcile(&request(orders(2), lifecycle))
            .await;
        assert_eq!(outcome, ReconcileOutcome::default());
        assert!(connector.gateway().calls().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_retry_message_churn_is_written() {
        let connector = InMemoryConnector::default();
        connector
            .gateway()
            .script("index_exists", Err(RemoteError::Transport("reset by peer".into())))
            .await;
        let mut req = request(orders(2), live());
        req.prior = Some(ObservedStatus::retry("connection refused"));

        let outcome = reconciler(connector.clone()).reconcile(&req).await;
        let status = outcome.status.expect("💀 a new retry message should be written");
        assert_eq!(status.state, ConvergenceState::Retry);
        assert!(status.message.contains("reset by peer"));
        assert_eq!(
            connector.gateway().calls().await,
            vec![GatewayCall::IndexExists("orders".to_string())]
        );
    }

    #[test]
    fn the_one_where_hints_follow_the_state() {
        let runtime = RuntimeConfig::default();
        assert_eq!(RecheckHint::for_state(ConvergenceState::Created).delay(&runtime), None);
        assert_eq!(RecheckHint::for_state(ConvergenceState::Retry), RecheckHint::Short);
        assert_eq!(RecheckHint::for_state(ConvergenceState::Error), RecheckHint::Long);
    }

    #[tokio::test]
    async fn the_one_where_the_reconciler_is_shared_across_tasks() {
        let gateway = InMemoryGateway::default();
        let r = std::sync::Arc::new(reconciler(InMemoryConnector::new(gateway.clone())));
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let r = r.clone();
                tokio::spawn(async move {
                    let mut object = orders(1);
                    if let DesiredObject::Index(spec) = &mut object {
                        spec.name = name.to_string();
                    }
                    r.reconcile(&request(object, live())).await
                })
            })
            .collect();
        for handle in handles {
            let outcome = handle.await.expect("💀 task should not panic");
            assert_eq!(outcome.status.map(|s| s.state), Some(ConvergenceState::Created));
        }
        assert_eq!(gateway.writes().await.len(), 3);
    }
}
