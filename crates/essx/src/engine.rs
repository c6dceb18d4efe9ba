//! 🧠 Convergence Engine — one desired object in, one observed status out.
//!
//! 🎬 INT. RECONCILE LOOP — EVERY TIME SOMETHING CHANGES
//!
//! The engine looks at what the cluster has, looks at what the user wants, and
//! decides the smallest honest thing to do about the difference: nothing, a
//! settings tweak, an additive mapping update, a create, or a flat refusal.
//!
//! Rules of the house:
//! - shards never change on an existing index;
//! - fields never disappear from a mapping;
//! - settings go before mappings, writes happen one at a time;
//! - every remote answer is classified exactly once, where it was received.
//!
//! The engine holds no state between passes. Give it a gateway and an object. 🦆

use tracing::{debug, info, warn};

use crate::common::{
    ConvergenceState, DesiredObject, IndexSpec, ObservedStatus, PipelineSpec, TemplateSpec,
};
use crate::compat::{self, DEFAULT_MAX_DEPTH};
use crate::gateway::SchemaGateway;
use crate::schema::{
    self, ModelError, current_replica_count, current_shard_count, extract_properties,
    json_equal, validate_shape,
};

/// 🧠 Drives one object towards its desired state through a gateway.
#[derive(Debug)]
pub struct ConvergenceEngine<'a, G: SchemaGateway + ?Sized> {
    gateway: &'a G,
    max_mapping_depth: usize,
}

/// 🔢 Outcome of the settings step for an existing index.
enum SettingsStep {
    Unchanged,
    Updated(ObservedStatus),
    Stop(ObservedStatus),
}

impl<'a, G: SchemaGateway + ?Sized> ConvergenceEngine<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            max_mapping_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_mapping_depth(mut self, depth: usize) -> Self {
        self.max_mapping_depth = depth;
        self
    }

    /// 🚀 One convergence pass.
    pub async fn converge(&self, object: &DesiredObject) -> ObservedStatus {
        if let Err(e) = validate_shape(object.model(), object.kind()) {
            warn!(error = %e, "🧱 desired model is malformed, refusing to touch the cluster");
            return ObservedStatus::error(e.to_string());
        }
        match object {
            DesiredObject::Index(spec) => self.converge_index(spec).await,
            DesiredObject::Template(spec) => self.converge_template(spec).await,
            DesiredObject::Pipeline(spec) => self.converge_pipeline(spec).await,
        }
    }

    async fn converge_index(&self, spec: &IndexSpec) -> ObservedStatus {
        let exists = match self.gateway.index_exists(&spec.name).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(error = %e, "🔍 could not tell whether the index exists");
                return e.to_status();
            }
        };

        if !exists {
            info!(index = %spec.name, "🌱 index is absent, creating it");
            return match self.gateway.create_index(&spec.name, &spec.model).await {
                Ok(response) => response.to_status(),
                Err(e) => e.to_status(),
            };
        }

        let mut last_write = None;
        match self.reconcile_settings(spec).await {
            SettingsStep::Stop(status) => return status,
            SettingsStep::Updated(status) => last_write = Some(status),
            SettingsStep::Unchanged => {}
        }
        match self.reconcile_properties(spec).await {
            Ok(Some(status)) => last_write = Some(status),
            Ok(None) => {}
            Err(status) => return status,
        }

        match last_write {
            Some(status) => status,
            None => {
                debug!(index = %spec.name, "✅ index already matches, nothing to do");
                ObservedStatus::created(Some(200), "")
            }
        }
    }

    /// 🔢 Shards are immutable, replicas are not.
    async fn reconcile_settings(&self, spec: &IndexSpec) -> SettingsStep {
        let from_model = schema::extract_shard_count(&spec.model);
        let desired_shards = match desired_count(from_model, spec.number_of_shards) {
            Ok(count) => count,
            Err(e) => return SettingsStep::Stop(ObservedStatus::error(e.to_string())),
        };
        let from_model = schema::extract_replica_count(&spec.model);
        let desired_replicas = match desired_count(from_model, spec.number_of_replicas) {
            Ok(count) => count,
            Err(e) => return SettingsStep::Stop(ObservedStatus::error(e.to_string())),
        };

        let settings = match self.gateway.index_settings(&spec.name).await {
            Ok(settings) => settings,
            Err(e) => return SettingsStep::Stop(e.to_status()),
        };
        let current = current_shard_count(&settings, &spec.name)
            .and_then(|shards| Ok((shards, current_replica_count(&settings, &spec.name)?)));
        let (current_shards, current_replicas) = match current {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "📡 cluster settings did not have the shape we expected");
                return SettingsStep::Stop(ObservedStatus::retry(e.to_string()));
            }
        };

        if desired_shards != current_shards {
            warn!(from = current_shards, to = desired_shards, "🧱 refusing to change shard count");
            return SettingsStep::Stop(ObservedStatus::error(format!(
                "you cannot update number_of_shards from {current_shards} to {desired_shards} on existing index {}",
                spec.name
            )));
        }
        if desired_replicas == current_replicas {
            return SettingsStep::Unchanged;
        }

        info!(from = current_replicas, to = desired_replicas, "🔄 updating replica count");
        let status = match self
            .gateway
            .put_index_replicas(&spec.name, desired_replicas)
            .await
        {
            Ok(response) => response.to_status(),
            Err(e) => e.to_status(),
        };
        if status.state == ConvergenceState::Created {
            SettingsStep::Updated(status)
        } else {
            SettingsStep::Stop(status)
        }
    }

    /// 🌳 Additive mapping updates only. `Ok(None)` means no call was needed.
    async fn reconcile_properties(
        &self,
        spec: &IndexSpec,
    ) -> Result<Option<ObservedStatus>, ObservedStatus> {
        let Some(desired) = extract_properties(&spec.model) else {
            return Ok(None);
        };
        let current = self
            .gateway
            .index_properties(&spec.name)
            .await
            .map_err(|e| e.to_status())?;
        let Some(current) = current else {
            return Ok(None);
        };
        if json_equal(&current, &desired) {
            return Ok(None);
        }
        if !compat::is_safe_update(&current, &desired, self.max_mapping_depth) {
            warn!("🧱 mapping update would remove fields, refusing it");
            return Err(ObservedStatus::error(format!(
                "you cannot delete properties, error while updating properties from {current} to {desired}"
            )));
        }

        info!("🌳 applying additive mapping update");
        let status = match self.gateway.put_index_properties(&spec.name, &desired).await {
            Ok(response) => response.to_status(),
            Err(e) => e.to_status(),
        };
        Ok(Some(status))
    }

    async fn converge_template(&self, spec: &TemplateSpec) -> ObservedStatus {
        let exists = match self.gateway.template_exists(&spec.name).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(error = %e, "🔍 could not tell whether the template exists");
                return e.to_status();
            }
        };
        if exists {
            info!(template = %spec.name, "🔄 replacing template");
        } else {
            info!(template = %spec.name, "🌱 template is absent, creating it");
        }
        match self
            .gateway
            .put_template(&spec.name, &spec.model, spec.order)
            .await
        {
            Ok(response) => response.to_status(),
            Err(e) => e.to_status(),
        }
    }

    async fn converge_pipeline(&self, spec: &PipelineSpec) -> ObservedStatus {
        info!(pipeline = %spec.name, "🚰 putting pipeline");
        match self.gateway.put_pipeline(&spec.name, &spec.model).await {
            Ok(response) => response.to_status(),
            Err(e) => e.to_status(),
        }
    }
}

/// 🔢 A count from the model, or the object's own field when the model leaves it out.
fn desired_count(from_model: Result<u32, ModelError>, from_spec: u32) -> Result<u32, ModelError> {
    match from_model {
        Ok(count) => Ok(count),
        Err(ModelError::NotFound { .. }) => Ok(from_spec),
        Err(e) => Err(e),
    }
}
