//! 🔌 Remote Schema Gateway — the only part of essx that talks to a cluster.
//!
//! 🎭 One trait, [`SchemaGateway`], and a casting call of implementations:
//! one per major wire dialect (6, 7, 8) behind [`GatewayBackend`], plus an
//! in-memory stand-in for tests. The convergence engine never learns which one
//! it got. Ignorance is a feature. We call it "abstraction".
//!
//! Shared plumbing (timeouts, auth, TLS posture) lives in [`transport`] above
//! the dialect boundary so it is written exactly once. 🦆

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::common::ObservedStatus;
use crate::connection::{ClusterVersion, ConnectionError, EsConnection};
use crate::status;

pub mod dialect;
pub mod elasticsearch;
pub mod in_mem;
pub mod transport;

pub use dialect::{Es6, Es7, Es8, OrderPlacement, WireDialect};
pub use elasticsearch::ElasticsearchGateway;
pub use in_mem::{GatewayCall, InMemoryConnector, InMemoryGateway};
pub use transport::{HttpTransport, TransportOptions};

/// 📡 A raw answer from the cluster: status code plus body, whatever the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        status::is_success(self.status)
    }

    /// 🚦 Run the answer through the classifier.
    pub fn to_status(&self) -> ObservedStatus {
        status::classify(self.status, self.body.clone())
    }

    /// 📦 Parse the body as JSON, but only for a 2xx answer.
    pub fn into_json(self) -> Result<Value, RemoteError> {
        if !self.is_success() {
            return Err(RemoteError::Status {
                code: self.status,
                body: self.body,
            });
        }
        serde_json::from_str(&self.body).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

/// 💀 A remote call that did not produce a usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("💀 transport failure: {0}")]
    Transport(String),
    #[error("💀 operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("💀 cluster answered {code}: {body}")]
    Status { code: u16, body: String },
    #[error("💀 cluster answered with a body we could not read: {0}")]
    Decode(String),
}

impl RemoteError {
    /// 🚦 Classify once, here. Codes go through the classifier; anything that
    /// never got a readable answer is transient.
    pub fn to_status(&self) -> ObservedStatus {
        match self {
            RemoteError::Status { code, body } => status::classify(*code, body.clone()),
            other => ObservedStatus::retry(other.to_string()),
        }
    }
}

/// 💀 Why we could not get a gateway at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// 🔄 The cluster did not answer the ping. Try again later.
    #[error("💀 cluster ping failed: {0}")]
    Unreachable(#[source] RemoteError),
    /// 🧱 The connection itself is wrong (bad URI, unsupported version).
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// 🧱 The HTTP client could not be built (TLS setup, usually).
    #[error("💀 could not build the HTTP client: {0}")]
    Client(String),
}

impl ConnectError {
    pub fn to_status(&self) -> ObservedStatus {
        match self {
            // 🚦 a 401 on the ping is as terminal as a 401 anywhere else
            ConnectError::Unreachable(e) => ObservedStatus {
                message: self.to_string(),
                ..e.to_status()
            },
            ConnectError::Connection(_) | ConnectError::Client(_) => {
                ObservedStatus::error(self.to_string())
            }
        }
    }
}

/// 🔌 Everything the engine may ask of a remote cluster.
///
/// # Contract
/// - Writes return `Ok(RemoteResponse)` for any HTTP answer, 2xx or not, so the
///   classifier sees the raw code and body.
/// - Reads return `Err(RemoteError::Status)` for a non-2xx answer.
/// - Existence checks map 404 to `false`; any other non-2xx is an error.
/// - Every call is bounded by the transport's operation timeout.
#[async_trait]
pub trait SchemaGateway: fmt::Debug + Send + Sync {
    fn version(&self) -> ClusterVersion;

    async fn ping(&self) -> Result<(), RemoteError>;

    async fn index_exists(&self, index: &str) -> Result<bool, RemoteError>;
    /// 📋 Raw `GET /{index}/_settings` body.
    async fn index_settings(&self, index: &str) -> Result<Value, RemoteError>;
    /// 🌳 Current untyped properties, wrapped as `{"properties": ...}`.
    async fn index_properties(&self, index: &str) -> Result<Option<Value>, RemoteError>;
    async fn put_index_replicas(
        &self,
        index: &str,
        replicas: u32,
    ) -> Result<RemoteResponse, RemoteError>;
    async fn put_index_properties(
        &self,
        index: &str,
        properties: &Value,
    ) -> Result<RemoteResponse, RemoteError>;
    async fn create_index(&self, index: &str, model: &str) -> Result<RemoteResponse, RemoteError>;
    async fn delete_index(&self, index: &str) -> Result<RemoteResponse, RemoteError>;

    async fn template_exists(&self, name: &str) -> Result<bool, RemoteError>;
    async fn put_template(
        &self,
        name: &str,
        model: &str,
        order: Option<i64>,
    ) -> Result<RemoteResponse, RemoteError>;
    async fn delete_template(&self, name: &str) -> Result<RemoteResponse, RemoteError>;

    async fn put_pipeline(&self, name: &str, model: &str) -> Result<RemoteResponse, RemoteError>;
    async fn delete_pipeline(&self, name: &str) -> Result<RemoteResponse, RemoteError>;

    /// 🗑️ Delete an index only if it is there. `Ok(None)` means nothing to do.
    async fn delete_index_if_present(
        &self,
        index: &str,
    ) -> Result<Option<RemoteResponse>, RemoteError> {
        if !self.index_exists(index).await? {
            debug!(index, "🗑️ index already gone, skipping delete");
            return Ok(None);
        }
        self.delete_index(index).await.map(Some)
    }

    /// 🗑️ Delete a template only if it is there. `Ok(None)` means nothing to do.
    async fn delete_template_if_present(
        &self,
        name: &str,
    ) -> Result<Option<RemoteResponse>, RemoteError> {
        if !self.template_exists(name).await? {
            debug!(template = name, "🗑️ template already gone, skipping delete");
            return Ok(None);
        }
        self.delete_template(name).await.map(Some)
    }

    /// 🗑️ Delete a pipeline; a 404 counts as already deleted.
    async fn delete_pipeline_if_present(
        &self,
        name: &str,
    ) -> Result<Option<RemoteResponse>, RemoteError> {
        let response = self.delete_pipeline(name).await?;
        if response.status == 404 {
            debug!(pipeline = name, "🗑️ pipeline already gone");
            return Ok(None);
        }
        Ok(Some(response))
    }
}

/// 🎭 The production gateway, one variant per wire dialect.
#[derive(Debug)]
pub enum GatewayBackend {
    Elasticsearch6(ElasticsearchGateway<Es6>),
    Elasticsearch7(ElasticsearchGateway<Es7>),
    Elasticsearch8(ElasticsearchGateway<Es8>),
}

impl GatewayBackend {
    pub fn for_version(version: ClusterVersion, transport: HttpTransport) -> Self {
        match version {
            ClusterVersion::V6 => GatewayBackend::Elasticsearch6(ElasticsearchGateway::new(transport)),
            ClusterVersion::V7 => GatewayBackend::Elasticsearch7(ElasticsearchGateway::new(transport)),
            ClusterVersion::V8 => GatewayBackend::Elasticsearch8(ElasticsearchGateway::new(transport)),
        }
    }
}

#[async_trait]
impl SchemaGateway for GatewayBackend {
    fn version(&self) -> ClusterVersion {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.version(),
            GatewayBackend::Elasticsearch7(es) => es.version(),
            GatewayBackend::Elasticsearch8(es) => es.version(),
        }
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.ping().await,
            GatewayBackend::Elasticsearch7(es) => es.ping().await,
            GatewayBackend::Elasticsearch8(es) => es.ping().await,
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.index_exists(index).await,
            GatewayBackend::Elasticsearch7(es) => es.index_exists(index).await,
            GatewayBackend::Elasticsearch8(es) => es.index_exists(index).await,
        }
    }

    async fn index_settings(&self, index: &str) -> Result<Value, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.index_settings(index).await,
            GatewayBackend::Elasticsearch7(es) => es.index_settings(index).await,
            GatewayBackend::Elasticsearch8(es) => es.index_settings(index).await,
        }
    }

    async fn index_properties(&self, index: &str) -> Result<Option<Value>, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.index_properties(index).await,
            GatewayBackend::Elasticsearch7(es) => es.index_properties(index).await,
            GatewayBackend::Elasticsearch8(es) => es.index_properties(index).await,
        }
    }

    async fn put_index_replicas(
        &self,
        index: &str,
        replicas: u32,
    ) -> Result<RemoteResponse, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.put_index_replicas(index, replicas).await,
            GatewayBackend::Elasticsearch7(es) => es.put_index_replicas(index, replicas).await,
            GatewayBackend::Elasticsearch8(es) => es.put_index_replicas(index, replicas).await,
        }
    }

    async fn put_index_properties(
        &self,
        index: &str,
        properties: &Value,
    ) -> Result<RemoteResponse, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.put_index_properties(index, properties).await,
            GatewayBackend::Elasticsearch7(es) => es.put_index_properties(index, properties).await,
            GatewayBackend::Elasticsearch8(es) => es.put_index_properties(index, properties).await,
        }
    }

    async fn create_index(&self, index: &str, model: &str) -> Result<RemoteResponse, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.create_index(index, model).await,
            GatewayBackend::Elasticsearch7(es) => es.create_index(index, model).await,
            GatewayBackend::Elasticsearch8(es) => es.create_index(index, model).await,
        }
    }

    async fn delete_index(&self, index: &str) -> Result<RemoteResponse, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.delete_index(index).await,
            GatewayBackend::Elasticsearch7(es) => es.delete_index(index).await,
            GatewayBackend::Elasticsearch8(es) => es.delete_index(index).await,
        }
    }

    async fn template_exists(&self, name: &str) -> Result<bool, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.template_exists(name).await,
            GatewayBackend::Elasticsearch7(es) => es.template_exists(name).await,
            GatewayBackend::Elasticsearch8(es) => es.template_exists(name).await,
        }
    }

    async fn put_template(
        &self,
        name: &str,
        model: &str,
        order: Option<i64>,
    ) -> Result<RemoteResponse, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.put_template(name, model, order).await,
            GatewayBackend::Elasticsearch7(es) => es.put_template(name, model, order).await,
            GatewayBackend::Elasticsearch8(es) => es.put_template(name, model, order).await,
        }
    }

    async fn delete_template(&self, name: &str) -> Result<RemoteResponse, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.delete_template(name).await,
            GatewayBackend::Elasticsearch7(es) => es.delete_template(name).await,
            GatewayBackend::Elasticsearch8(es) => es.delete_template(name).await,
        }
    }

    async fn put_pipeline(&self, name: &str, model: &str) -> Result<RemoteResponse, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.put_pipeline(name, model).await,
            GatewayBackend::Elasticsearch7(es) => es.put_pipeline(name, model).await,
            GatewayBackend::Elasticsearch8(es) => es.put_pipeline(name, model).await,
        }
    }

    async fn delete_pipeline(&self, name: &str) -> Result<RemoteResponse, RemoteError> {
        match self {
            GatewayBackend::Elasticsearch6(es) => es.delete_pipeline(name).await,
            GatewayBackend::Elasticsearch7(es) => es.delete_pipeline(name).await,
            GatewayBackend::Elasticsearch8(es) => es.delete_pipeline(name).await,
        }
    }
}

/// 🚀 Ping the cluster, learn its dialect, hand back the matching gateway.
///
/// A version already on the connection wins over the one the cluster reports.
pub async fn connect(
    connection: &EsConnection,
    options: &TransportOptions,
) -> Result<GatewayBackend, ConnectError> {
    let transport = HttpTransport::new(connection, options)?;
    let root = transport
        .get("/")
        .await
        .and_then(RemoteResponse::into_json)
        .map_err(ConnectError::Unreachable)?;

    let version = match connection.version {
        Some(known) => known,
        None => {
            let reported = root
                .pointer("/version/number")
                .and_then(Value::as_str)
                .unwrap_or_default();
            ClusterVersion::from_version_number(reported)?
        }
    };
    info!(cluster = %connection, %version, "📡 connected to cluster");
    Ok(GatewayBackend::for_version(version, transport))
}

/// 🏭 Something that turns a resolved connection into a live gateway.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    type Gateway: SchemaGateway;

    async fn connect(&self, connection: &EsConnection) -> Result<Self::Gateway, ConnectError>;
}

/// 🏭 The real thing: HTTP, pings, version detection.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    options: TransportOptions,
}

impl HttpConnector {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl GatewayConnector for HttpConnector {
    type Gateway = GatewayBackend;

    async fn connect(&self, connection: &EsConnection) -> Result<GatewayBackend, ConnectError> {
        connect(connection, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ConvergenceState;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection_for(server: &MockServer) -> EsConnection {
        EsConnection::from_uri(&server.uri()).expect("💀 wiremock URI should parse")
    }

    fn root_body(number: &str) -> serde_json::Value {
        serde_json::json!({"name": "node-1", "version": {"number": number}})
    }

    #[test]
    fn the_one_where_remote_errors_classify_exactly_once() {
        let not_found = RemoteError::Status {
            code: 404,
            body: "KO".to_string(),
        };
        assert_eq!(not_found.to_status().state, ConvergenceState::Error);
        assert_eq!(not_found.to_status().code, Some(404));

        let overloaded = RemoteError::Status {
            code: 503,
            body: "busy".to_string(),
        };
        assert_eq!(overloaded.to_status().state, ConvergenceState::Retry);

        let timeout = RemoteError::Timeout(Duration::from_secs(10));
        assert_eq!(timeout.to_status().state, ConvergenceState::Retry);
        assert_eq!(timeout.to_status().code, None);
    }

    #[test]
    fn the_one_where_connect_errors_split_into_retry_and_error() {
        let unreachable = ConnectError::Unreachable(RemoteError::Transport("refused".into()));
        assert_eq!(unreachable.to_status().state, ConvergenceState::Retry);

        let unsupported =
            ConnectError::Connection(ConnectionError::UnsupportedVersion("5.6.0".into()));
        assert_eq!(unsupported.to_status().state, ConvergenceState::Error);
    }

    #[tokio::test]
    async fn the_one_where_connect_detects_each_dialect() {
        for (number, expected) in [
            ("6.8.23", ClusterVersion::V6),
            ("7.17.9", ClusterVersion::V7),
            ("8.11.1", ClusterVersion::V8),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/"))
                .respond_with(ResponseTemplate::new(200).set_body_json(root_body(number)))
                .mount(&server)
                .await;

            let gateway = connect(&connection_for(&server), &TransportOptions::default())
                .await
                .expect("💀 connect should succeed against a healthy mock");
            assert_eq!(gateway.version(), expected, "version {number}");
        }
    }

    #[tokio::test]
    async fn the_one_where_an_ancient_cluster_is_a_configuration_problem() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(root_body("5.6.16")))
            .mount(&server)
            .await;

        let err = connect(&connection_for(&server), &TransportOptions::default())
            .await
            .expect_err("💀 version 5 should be refused");
        assert!(matches!(
            err,
            ConnectError::Connection(ConnectionError::UnsupportedVersion(_))
        ));
        assert_eq!(err.to_status().state, ConvergenceState::Error);
    }

    #[tokio::test]
    async fn the_one_where_a_sick_cluster_means_try_again_later() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("master not discovered"))
            .mount(&server)
            .await;

        let err = connect(&connection_for(&server), &TransportOptions::default())
            .await
            .expect_err("💀 a 503 ping should not connect");
        assert!(matches!(err, ConnectError::Unreachable(_)));
        assert_eq!(err.to_status().state, ConvergenceState::Retry);
    }

    #[tokio::test]
    async fn the_one_where_bad_credentials_on_the_ping_are_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("security_exception"))
            .mount(&server)
            .await;

        let err = connect(&connection_for(&server), &TransportOptions::default())
            .await
            .expect_err("💀 a 401 ping should not connect");
        let status = err.to_status();
        assert_eq!(status.state, ConvergenceState::Error);
        assert_eq!(status.code, Some(401));
        assert!(status.message.contains("security_exception"));
    }

    #[tokio::test]
    async fn the_one_where_a_known_version_skips_detection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(root_body("7.10.2")))
            .mount(&server)
            .await;

        let connection = connection_for(&server).with_version(ClusterVersion::V8);
        let gateway = HttpConnector::new(TransportOptions::default())
            .connect(&connection)
            .await
            .expect("💀 connect should succeed");
        assert_eq!(gateway.version(), ClusterVersion::V8);
    }
}
