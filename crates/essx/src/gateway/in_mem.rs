//! 🧪 A cluster that lives in a `BTreeMap` and remembers every call you made.
//!
//! `InMemoryGateway` plays Elasticsearch for tests: indices, templates and
//! pipelines in RAM, plus a call log so assertions like "issued no write" are a
//! one-liner. Clone it freely; every clone shares the same cluster through the
//! `Arc`. Scripted failures let a test make any call answer whatever it likes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{ConnectError, GatewayConnector, RemoteError, RemoteResponse, SchemaGateway};
use crate::connection::{ClusterVersion, EsConnection};
use crate::schema::{extract_properties, extract_replica_count, extract_shard_count};

const ACKNOWLEDGED: &str = r#"{"acknowledged":true}"#;

/// 📼 One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Ping,
    IndexExists(String),
    IndexSettings(String),
    IndexProperties(String),
    PutIndexReplicas { index: String, replicas: u32 },
    PutIndexProperties { index: String, properties: Value },
    CreateIndex { index: String, model: String },
    DeleteIndex(String),
    TemplateExists(String),
    PutTemplate { name: String, model: String, order: Option<i64> },
    DeleteTemplate(String),
    PutPipeline { name: String, model: String },
    DeletePipeline(String),
}

impl GatewayCall {
    /// ✍️ Does this call change anything on the cluster?
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            GatewayCall::Ping
                | GatewayCall::IndexExists(_)
                | GatewayCall::IndexSettings(_)
                | GatewayCall::IndexProperties(_)
                | GatewayCall::TemplateExists(_)
        )
    }

    fn label(&self) -> &'static str {
        match self {
            GatewayCall::Ping => "ping",
            GatewayCall::IndexExists(_) => "index_exists",
            GatewayCall::IndexSettings(_) => "index_settings",
            GatewayCall::IndexProperties(_) => "index_properties",
            GatewayCall::PutIndexReplicas { .. } => "put_index_replicas",
            GatewayCall::PutIndexProperties { .. } => "put_index_properties",
            GatewayCall::CreateIndex { .. } => "create_index",
            GatewayCall::DeleteIndex(_) => "delete_index",
            GatewayCall::TemplateExists(_) => "template_exists",
            GatewayCall::PutTemplate { .. } => "put_template",
            GatewayCall::DeleteTemplate(_) => "delete_template",
            GatewayCall::PutPipeline { .. } => "put_pipeline",
            GatewayCall::DeletePipeline(_) => "delete_pipeline",
        }
    }
}

/// 📦 What the pretend cluster knows about one index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredIndex {
    pub shards: u32,
    pub replicas: u32,
    pub properties: Option<Value>,
}

#[derive(Debug, Default)]
struct Cluster {
    indices: BTreeMap<String, StoredIndex>,
    templates: BTreeMap<String, String>,
    pipelines: BTreeMap<String, String>,
    calls: Vec<GatewayCall>,
    scripted: HashMap<&'static str, Result<RemoteResponse, RemoteError>>,
}

#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    version: ClusterVersion,
    cluster: Arc<Mutex<Cluster>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new(ClusterVersion::V8)
    }
}

impl InMemoryGateway {
    pub fn new(version: ClusterVersion) -> Self {
        Self {
            version,
            cluster: Arc::new(Mutex::new(Cluster::default())),
        }
    }

    /// 🌱 Seed an index as if someone created it long ago.
    pub async fn seed_index(&self, name: &str, shards: u32, replicas: u32, properties: Option<Value>) {
        self.cluster.lock().await.indices.insert(
            name.to_string(),
            StoredIndex {
                shards,
                replicas,
                properties,
            },
        );
    }

    pub async fn seed_template(&self, name: &str, model: &str) {
        self.cluster
            .lock()
            .await
            .templates
            .insert(name.to_string(), model.to_string());
    }

    pub async fn seed_pipeline(&self, name: &str, model: &str) {
        self.cluster
            .lock()
            .await
            .pipelines
            .insert(name.to_string(), model.to_string());
    }

    /// 🎬 Make every future call of `method` (e.g. `"create_index"`) answer with `outcome`.
    pub async fn script(&self, method: &'static str, outcome: Result<RemoteResponse, RemoteError>) {
        self.cluster.lock().await.scripted.insert(method, outcome);
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.cluster.lock().await.calls.clone()
    }

    pub async fn writes(&self) -> Vec<GatewayCall> {
        self.calls()
            .await
            .into_iter()
            .filter(GatewayCall::is_write)
            .collect()
    }

    pub async fn index(&self, name: &str) -> Option<StoredIndex> {
        self.cluster.lock().await.indices.get(name).cloned()
    }

    pub async fn template(&self, name: &str) -> Option<String> {
        self.cluster.lock().await.templates.get(name).cloned()
    }

    pub async fn pipeline(&self, name: &str) -> Option<String> {
        self.cluster.lock().await.pipelines.get(name).cloned()
    }

    /// 📼 Record the call and hand back a scripted outcome if one is set.
    async fn record(&self, call: GatewayCall) -> Option<Result<RemoteResponse, RemoteError>> {
        let mut cluster = self.cluster.lock().await;
        let scripted = cluster.scripted.get(call.label()).cloned();
        cluster.calls.push(call);
        scripted
    }

    /// 🔍 Scripted outcome for a read: non-2xx answers become errors.
    async fn record_read(&self, call: GatewayCall) -> Option<Result<RemoteResponse, RemoteError>> {
        self.record(call).await.map(|outcome| {
            outcome.and_then(|response| {
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(RemoteError::Status {
                        code: response.status,
                        body: response.body,
                    })
                }
            })
        })
    }
}

fn acknowledged() -> RemoteResponse {
    RemoteResponse::new(200, ACKNOWLEDGED)
}

fn not_found(what: &str) -> RemoteResponse {
    RemoteResponse::new(404, format!(r#"{{"error":"{what} not found","status":404}}"#))
}

#[async_trait]
impl SchemaGateway for InMemoryGateway {
    fn version(&self) -> ClusterVersion {
        self.version
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        match self.record_read(GatewayCall::Ping).await {
            Some(outcome) => outcome.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool, RemoteError> {
        if let Some(outcome) = self.record(GatewayCall::IndexExists(index.to_string())).await {
            let response = outcome?;
            return match response.status {
                404 => Ok(false),
                code if crate::status::is_success(code) => Ok(true),
                code => Err(RemoteError::Status {
                    code,
                    body: response.body,
                }),
            };
        }
        Ok(self.cluster.lock().await.indices.contains_key(index))
    }

    async fn index_settings(&self, index: &str) -> Result<Value, RemoteError> {
        if let Some(outcome) = self.record_read(GatewayCall::IndexSettings(index.to_string())).await {
            return outcome?.into_json();
        }
        let cluster = self.cluster.lock().await;
        let stored = cluster.indices.get(index).ok_or_else(|| RemoteError::Status {
            code: 404,
            body: not_found(index).body,
        })?;
        Ok(json!({
            index: {"settings": {"index": {
                "number_of_shards": stored.shards.to_string(),
                "number_of_replicas": stored.replicas.to_string(),
            }}}
        }))
    }

    async fn index_properties(&self, index: &str) -> Result<Option<Value>, RemoteError> {
        if let Some(outcome) = self.record_read(GatewayCall::IndexProperties(index.to_string())).await {
            let mapping = outcome?.into_json()?;
            return Ok(crate::schema::current_properties(&mapping, index));
        }
        let cluster = self.cluster.lock().await;
        let stored = cluster.indices.get(index).ok_or_else(|| RemoteError::Status {
            code: 404,
            body: not_found(index).body,
        })?;
        Ok(stored.properties.clone())
    }

    async fn put_index_replicas(
        &self,
        index: &str,
        replicas: u32,
    ) -> Result<RemoteResponse, RemoteError> {
        let call = GatewayCall::PutIndexReplicas {
            index: index.to_string(),
            replicas,
        };
        if let Some(outcome) = self.record(call).await {
            return outcome;
        }
        let mut cluster = self.cluster.lock().await;
        Ok(match cluster.indices.get_mut(index) {
            Some(stored) => {
                stored.replicas = replicas;
                acknowledged()
            }
            None => not_found(index),
        })
    }

    async fn put_index_properties(
        &self,
        index: &str,
        properties: &Value,
    ) -> Result<RemoteResponse, RemoteError> {
        let call = GatewayCall::PutIndexProperties {
            index: index.to_string(),
            properties: properties.clone(),
        };
        if let Some(outcome) = self.record(call).await {
            return outcome;
        }
        let mut cluster = self.cluster.lock().await;
        Ok(match cluster.indices.get_mut(index) {
            Some(stored) => {
                stored.properties = Some(properties.clone());
                acknowledged()
            }
            None => not_found(index),
        })
    }

    async fn create_index(&self, index: &str, model: &str) -> Result<RemoteResponse, RemoteError> {
        let call = GatewayCall::CreateIndex {
            index: index.to_string(),
            model: model.to_string(),
        };
        if let Some(outcome) = self.record(call).await {
            return outcome;
        }
        let mut cluster = self.cluster.lock().await;
        if cluster.indices.contains_key(index) {
            return Ok(RemoteResponse::new(
                400,
                r#"{"error":"resource_already_exists_exception","status":400}"#,
            ));
        }
        cluster.indices.insert(
            index.to_string(),
            StoredIndex {
                shards: extract_shard_count(model).unwrap_or(1),
                replicas: extract_replica_count(model).unwrap_or(1),
                properties: extract_properties(model),
            },
        );
        Ok(acknowledged())
    }

    async fn delete_index(&self, index: &str) -> Result<RemoteResponse, RemoteError> {
        if let Some(outcome) = self.record(GatewayCall::DeleteIndex(index.to_string())).await {
            return outcome;
        }
        let removed = self.cluster.lock().await.indices.remove(index);
        Ok(removed.map(|_| acknowledged()).unwrap_or_else(|| not_found(index)))
    }

    async fn template_exists(&self, name: &str) -> Result<bool, RemoteError> {
        if let Some(outcome) = self.record(GatewayCall::TemplateExists(name.to_string())).await {
            let response = outcome?;
            return match response.status {
                404 => Ok(false),
                code if crate::status::is_success(code) => Ok(true),
                code => Err(RemoteError::Status {
                    code,
                    body: response.body,
                }),
            };
        }
        Ok(self.cluster.lock().await.templates.contains_key(name))
    }

    async fn put_template(
        &self,
        name: &str,
        model: &str,
        order: Option<i64>,
    ) -> Result<RemoteResponse, RemoteError> {
        let call = GatewayCall::PutTemplate {
            name: name.to_string(),
            model: model.to_string(),
            order,
        };
        if let Some(outcome) = self.record(call).await {
            return outcome;
        }
        self.cluster
            .lock()
            .await
            .templates
            .insert(name.to_string(), model.to_string());
        Ok(acknowledged())
    }

    async fn delete_template(&self, name: &str) -> Result<RemoteResponse, RemoteError> {
        if let Some(outcome) = self.record(GatewayCall::DeleteTemplate(name.to_string())).await {
            return outcome;
        }
        let removed = self.cluster.lock().await.templates.remove(name);
        Ok(removed.map(|_| acknowledged()).unwrap_or_else(|| not_found(name)))
    }

    async fn put_pipeline(&self, name: &str, model: &str) -> Result<RemoteResponse, RemoteError> {
        let call = GatewayCall::PutPipeline {
            name: name.to_string(),
            model: model.to_string(),
        };
        if let Some(outcome) = self.record(call).await {
            return outcome;
        }
        self.cluster
            .lock()
            .await
            .pipelines
            .insert(name.to_string(), model.to_string());
        Ok(acknowledged())
    }

    async fn delete_pipeline(&self, name: &str) -> Result<RemoteResponse, RemoteError> {
        if let Some(outcome) = self.record(GatewayCall::DeletePipeline(name.to_string())).await {
            return outcome;
        }
        let removed = self.cluster.lock().await.pipelines.remove(name);
        Ok(removed.map(|_| acknowledged()).unwrap_or_else(|| not_found(name)))
    }
}

/// 🏭 Hands out clones of one shared [`InMemoryGateway`], or a scripted connect failure.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    gateway: InMemoryGateway,
    failure: Option<ConnectError>,
}

impl InMemoryConnector {
    pub fn new(gateway: InMemoryGateway) -> Self {
        Self {
            gateway,
            failure: None,
        }
    }

    pub fn failing(failure: ConnectError) -> Self {
        Self {
            gateway: InMemoryGateway::default(),
            failure: Some(failure),
        }
    }

    pub fn gateway(&self) -> &InMemoryGateway {
        &self.gateway
    }
}

#[async_trait]
impl GatewayConnector for InMemoryConnector {
    type Gateway = InMemoryGateway;

    async fn connect(&self, _connection: &EsConnection) -> Result<InMemoryGateway, ConnectError> {
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(self.gateway.clone()),
        }
    }
}
