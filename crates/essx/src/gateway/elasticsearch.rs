//! 📡 The Elasticsearch gateway, generic over its wire dialect.
//!
//! Paths, verbs and bodies live here once. The dialect marker decides the
//! handful of query flags that differ between majors.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::dialect::{OrderPlacement, WireDialect};
use super::transport::{HttpTransport, with_query};
use super::{RemoteError, RemoteResponse, SchemaGateway};
use crate::connection::ClusterVersion;
use crate::schema::current_properties;

#[derive(Debug)]
pub struct ElasticsearchGateway<D: WireDialect> {
    transport: HttpTransport,
    _dialect: PhantomData<D>,
}

impl<D: WireDialect> ElasticsearchGateway<D> {
    pub fn new(transport: HttpTransport) -> Self {
        Self {
            transport,
            _dialect: PhantomData,
        }
    }

    fn type_name_params(flag: Option<bool>) -> Vec<(&'static str, String)> {
        flag.map(|flag| vec![("include_type_name", flag.to_string())])
            .unwrap_or_default()
    }

    /// 🔢 Put `order` where this dialect expects it.
    fn template_request(
        name: &str,
        model: &str,
        order: Option<i64>,
    ) -> (String, String) {
        let mut params = Self::type_name_params(D::type_name_flag(model));
        let mut body = model.to_string();
        if let Some(order) = order {
            match D::TEMPLATE_ORDER {
                OrderPlacement::QueryParam => params.push(("order", order.to_string())),
                OrderPlacement::Body => {
                    // A body that is not an object goes out untouched; the cluster rejects it.
                    if let Ok(Value::Object(mut template)) = serde_json::from_str::<Value>(model) {
                        template.insert("order".to_string(), json!(order));
                        body = Value::Object(template).to_string();
                    }
                }
            }
        }
        (with_query(&format!("/_template/{name}"), &params), body)
    }
}

#[async_trait]
impl<D: WireDialect> SchemaGateway for ElasticsearchGateway<D> {
    fn version(&self) -> ClusterVersion {
        D::VERSION
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.transport.get("/").await?.into_json().map(|_| ())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, RemoteError> {
        self.transport.exists(&format!("/{index}")).await
    }

    async fn index_settings(&self, index: &str) -> Result<Value, RemoteError> {
        self.transport
            .get(&format!("/{index}/_settings"))
            .await?
            .into_json()
    }

    async fn index_properties(&self, index: &str) -> Result<Option<Value>, RemoteError> {
        let path = with_query(
            &format!("/{index}/_mapping"),
            &Self::type_name_params(D::untyped_mapping_flag()),
        );
        let mapping = self.transport.get(&path).await?.into_json()?;
        Ok(current_properties(&mapping, index))
    }

    async fn put_index_replicas(
        &self,
        index: &str,
        replicas: u32,
    ) -> Result<RemoteResponse, RemoteError> {
        debug!(index, replicas, "📡 updating replica count");
        let body = json!({"index": {"number_of_replicas": replicas}});
        self.transport
            .put(&format!("/{index}/_settings"), body.to_string())
            .await
    }

    async fn put_index_properties(
        &self,
        index: &str,
        properties: &Value,
    ) -> Result<RemoteResponse, RemoteError> {
        debug!(index, "📡 updating mapping properties");
        let path = with_query(
            &format!("/{index}/_mapping"),
            &Self::type_name_params(D::untyped_mapping_flag()),
        );
        self.transport.put(&path, properties.to_string()).await
    }

    async fn create_index(&self, index: &str, model: &str) -> Result<RemoteResponse, RemoteError> {
        debug!(index, "📡 creating index");
        let path = with_query(
            &format!("/{index}"),
            &Self::type_name_params(D::type_name_flag(model)),
        );
        self.transport.put(&path, model.to_string()).await
    }

    async fn delete_index(&self, index: &str) -> Result<RemoteResponse, RemoteError> {
        self.transport.delete(&format!("/{index}")).await
    }

    async fn template_exists(&self, name: &str) -> Result<bool, RemoteError> {
        self.transport.exists(&format!("/_template/{name}")).await
    }

    async fn put_template(
        &self,
        name: &str,
        model: &str,
        order: Option<i64>,
    ) -> Result<RemoteResponse, RemoteError> {
        debug!(template = name, ?order, "📡 putting template");
        let (path, body) = Self::template_request(name, model, order);
        self.transport.put(&path, body).await
    }

    async fn delete_template(&self, name: &str) -> Result<RemoteResponse, RemoteError> {
        self.transport.delete(&format!("/_template/{name}")).await
    }

    async fn put_pipeline(&self, name: &str, model: &str) -> Result<RemoteResponse, RemoteError> {
        debug!(pipeline = name, "📡 putting pipeline");
        self.transport
            .put(&format!("/_ingest/pipeline/{name}"), model.to_string())
            .await
    }

    async fn delete_pipeline(&self, name: &str) -> Result<RemoteResponse, RemoteError> {
        self.transport
            .delete(&format!("/_ingest/pipeline/{name}"))
            .await
    }
}
