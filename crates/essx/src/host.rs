//! 🏠 Host — a small, file-backed stand-in for the thing that usually calls us.
//!
//! A real deployment has a control plane that watches objects, queues work and
//! stores status. Here the "store" is a JSON state file and the "watch" is
//! whoever runs `essx apply`. Each run is one reconciliation pass per
//! configured object: admission first, then the [`Reconciler`], then the
//! outcome is folded back into the state file.
//!
//! Objects are reconciled concurrently with each other. The same object is
//! never in flight twice, because each appears once per pass. 🦆

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::admission::{default_model, validate_create, validate_update};
use crate::app_config::{AppConfig, ObjectEntry};
use crate::common::{DesiredObject, ObjectKind, ObservedStatus};
use crate::connection::{ConnectionError, EsConnection};
use crate::finalizer::{Lifecycle, MarkerAction};
use crate::gateway::GatewayConnector;
use crate::reconciler::{ReconcileOutcome, ReconcileRequest, Reconciler};

/// 📋 What the host remembers about one object between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ObservedStatus>,
    #[serde(default)]
    pub markers: Vec<String>,
    /// 📦 The last admitted (defaulted) entry. The "old" side of update checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<ObjectEntry>,
    /// 🔌 Where `applied` lives. Stored without the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EsConnection>,
}

impl ObjectState {
    fn has_marker(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| m == marker)
    }

    fn apply_marker(&mut self, action: MarkerAction, marker: &str) {
        match action {
            MarkerAction::Keep => {}
            MarkerAction::Add => {
                if !self.has_marker(marker) {
                    self.markers.push(marker.to_string());
                }
            }
            MarkerAction::Remove => self.markers.retain(|m| m != marker),
        }
    }
}

/// 💾 The whole store, keyed by `Kind/name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectState>,
}

impl StateFile {
    /// 📂 Read the state file. A missing file is an empty store, not an error.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw).with_context(|| {
                format!(
                    "💀 State file '{}' exists but is not a state file we recognize.",
                    path.display()
                )
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "📂 no state file yet, starting fresh");
                Ok(Self::default())
            }
            Err(e) => Err(e)
                .with_context(|| format!("💀 Failed to read state file '{}'", path.display())),
        }
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self).context("💀 Failed to serialize state")?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("💀 Failed to write state file '{}'", path.display()))
    }

    pub fn get(&self, kind: ObjectKind, name: &str) -> Option<&ObjectState> {
        self.objects.get(&state_key(kind, name))
    }
}

pub fn state_key(kind: ObjectKind, name: &str) -> String {
    format!("{kind}/{name}")
}

/// 📊 One row of the summary the CLI prints.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectReport {
    pub kind: ObjectKind,
    pub name: String,
    /// The stored status after this pass, written or not.
    pub status: Option<ObservedStatus>,
    /// `true` when this pass overwrote the stored status.
    pub written: bool,
    pub recheck: Option<Duration>,
    pub marker: MarkerAction,
}

/// 🗑️ What `delete` did, and which names it could not find anywhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteSummary {
    pub reports: Vec<ObjectReport>,
    pub missing: Vec<String>,
}

/// 🛂 Offline verdict for one configured object.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionReport {
    pub kind: ObjectKind,
    pub name: String,
    pub verdict: Result<(), String>,
}

/// 🔌 Turn a connection reference into an endpoint, via the config's connection table.
pub fn resolve_connection(
    connections: &BTreeMap<String, String>,
    reference: &str,
) -> Result<EsConnection, ConnectionError> {
    let uri = connections
        .get(reference)
        .ok_or_else(|| ConnectionError::UnknownReference(reference.to_string()))?;
    EsConnection::from_uri(uri)
}

/// 🛂 Default then validate, against the stored version of the object when there is one.
///
/// Returns the defaulted entry, or every reason it was refused as one message.
pub fn admit(
    entry: &ObjectEntry,
    connection: Option<&EsConnection>,
    stored: Option<&ObjectState>,
) -> Result<ObjectEntry, String> {
    let mut admitted = entry.clone();
    default_model(&mut admitted.object)
        .map_err(|e| format!("💀 model could not be defaulted: {e}"))?;

    let verdict = match stored.and_then(|s| s.applied.as_ref()) {
        Some(previous) => validate_update(
            &previous.object,
            &admitted.object,
            stored.and_then(|s| s.endpoint.as_ref()),
            connection,
        ),
        None => validate_create(&admitted.object),
    };
    verdict.map_err(|e| e.to_string())?;
    Ok(admitted)
}

struct Pending {
    key: String,
    admitted: ObjectEntry,
    endpoint: Option<EsConnection>,
    request: ReconcileRequest,
}

/// 🚀 One reconciliation pass over every configured object.
pub async fn apply<C: GatewayConnector>(
    config: &AppConfig,
    reconciler: &Reconciler<C>,
    state: &mut StateFile,
) -> Vec<ObjectReport> {
    let marker = reconciler.marker_name().to_string();
    let mut reports = Vec::new();
    let mut pending = Vec::new();

    for entry in &config.objects {
        let object = &entry.object;
        let key = state_key(object.kind(), object.name());
        let connection = resolve_connection(&config.connections, object.connection());
        let stored = state.objects.get(&key);

        match admit(entry, connection.as_ref().ok(), stored) {
            Ok(admitted) => {
                let stored = stored.cloned().unwrap_or_default();
                pending.push(Pending {
                    key,
                    endpoint: connection.as_ref().ok().map(EsConnection::without_password),
                    request: ReconcileRequest {
                        object: admitted.object.clone(),
                        connection,
                        prior: stored.status.clone(),
                        lifecycle: Lifecycle {
                            deletion_requested: false,
                            marker_present: stored.has_marker(&marker),
                            delete_in_cluster: admitted.delete_in_cluster,
                        },
                    },
                    admitted,
                });
            }
            Err(message) => {
                warn!(kind = %object.kind(), name = object.name(), %message, "🛂 object refused at admission");
                let rejected = ObservedStatus::error(message);
                let slot = state.objects.entry(key).or_default();
                let written = rejected.supersedes(slot.status.as_ref());
                if written {
                    slot.status = Some(rejected);
                }
                reports.push(ObjectReport {
                    kind: object.kind(),
                    name: object.name().to_string(),
                    status: slot.status.clone(),
                    written,
                    recheck: None,
                    marker: MarkerAction::Keep,
                });
            }
        }
    }

    let outcomes = join_all(pending.iter().map(|p| reconciler.reconcile(&p.request))).await;
    for (p, outcome) in pending.into_iter().zip(outcomes) {
        let slot = state.objects.entry(p.key).or_default();
        let report = fold_outcome(slot, &p.request.object, &outcome, &marker, reconciler);
        slot.applied = Some(p.admitted);
        slot.endpoint = p.endpoint;
        reports.push(report);
    }

    info!(objects = reports.len(), "🏁 apply pass finished");
    reports
}

/// 🗑️ Mark the named objects for deletion and run the finalization pass.
///
/// A name given twice is handled once, so no object is finalized twice at the same time.
///
/// Names are looked up in the config first, then among objects the state file
/// still remembers, so an object dropped from the config can still be cleaned up.
pub async fn delete<C: GatewayConnector>(
    config: &AppConfig,
    reconciler: &Reconciler<C>,
    state: &mut StateFile,
    names: &[String],
) -> DeleteSummary {
    let marker = reconciler.marker_name().to_string();
    let mut summary = DeleteSummary::default();
    let mut pending = Vec::new();

    let mut seen = BTreeSet::new();
    for name in names.iter().filter(|n| seen.insert(n.as_str())) {
        let targets = deletion_targets(config, state, name);
        if targets.is_empty() {
            warn!(%name, "🤷 nothing by that name in config or state");
            summary.missing.push(name.clone());
            continue;
        }
        for entry in targets {
            let key = state_key(entry.object.kind(), entry.object.name());
            let stored = state.objects.get(&key).cloned().unwrap_or_default();
            let connection = resolve_connection(&config.connections, entry.object.connection());
            pending.push((
                key,
                ReconcileRequest {
                    object: entry.object,
                    connection,
                    prior: stored.status.clone(),
                    lifecycle: Lifecycle {
                        deletion_requested: true,
                        marker_present: stored.has_marker(&marker),
                        delete_in_cluster: entry.delete_in_cluster,
                    },
                },
            ));
        }
    }

    let outcomes = join_all(pending.iter().map(|(_, r)| reconciler.reconcile(r))).await;
    for ((key, request), outcome) in pending.into_iter().zip(outcomes) {
        let slot = state.objects.entry(key.clone()).or_default();
        let report = fold_outcome(slot, &request.object, &outcome, &marker, reconciler);
        if !slot.has_marker(&marker) {
            info!(%key, "🔓 marker gone, forgetting object");
            state.objects.remove(&key);
        }
        summary.reports.push(report);
    }
    summary
}

/// ✅ Admission only. No cluster is contacted.
pub fn validate(config: &AppConfig, state: &StateFile) -> Vec<AdmissionReport> {
    config
        .objects
        .iter()
        .map(|entry| {
            let object = &entry.object;
            let connection = resolve_connection(&config.connections, object.connection());
            let stored = state.get(object.kind(), object.name());
            AdmissionReport {
                kind: object.kind(),
                name: object.name().to_string(),
                verdict: admit(entry, connection.as_ref().ok(), stored).map(|_| ()),
            }
        })
        .collect()
}

fn deletion_targets(config: &AppConfig, state: &StateFile, name: &str) -> Vec<ObjectEntry> {
    let configured: Vec<ObjectEntry> = config
        .objects
        .iter()
        .filter(|e| e.object.name() == name)
        .cloned()
        .collect();
    if !configured.is_empty() {
        return configured;
    }
    state
        .objects
        .values()
        .filter_map(|s| s.applied.as_ref())
        .filter(|e| e.object.name() == name)
        .cloned()
        .collect()
}

fn fold_outcome<C: GatewayConnector>(
    slot: &mut ObjectState,
    object: &DesiredObject,
    outcome: &ReconcileOutcome,
    marker: &str,
    reconciler: &Reconciler<C>,
) -> ObjectReport {
    if let Some(status) = &outcome.status {
        slot.status = Some(status.clone());
    }
    slot.apply_marker(outcome.marker, marker);
    ObjectReport {
        kind: object.kind(),
        name: object.name().to_string(),
        status: slot.status.clone(),
        written: outcome.status.is_some(),
        recheck: outcome.recheck.delay(reconciler.runtime()),
        marker: outcome.marker,
    }
}
