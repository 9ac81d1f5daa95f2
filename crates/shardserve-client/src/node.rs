//! DNode client
//!
//! Each call is a self-contained request: the connection is acquired for
//! the call and released when it returns, whatever the outcome.

use async_trait::async_trait;
use serde::Serialize;
use shardserve_common::config::ClientConfig;
use shardserve_common::{NodeAddress, TablespaceVersion};
use std::time::Duration;
use tracing::debug;

/// Error type for DNode calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("application error: {0}")]
    Application(String),

    #[error("request timeout")]
    Timeout,
}

impl NodeError {
    /// Whether the node could not be reached (timeouts included)
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

/// Query against one partition of one tablespace version
#[derive(Clone, Debug, Serialize)]
pub struct QueryRequest {
    pub tablespace: String,
    pub version: i64,
    pub partition: u32,
    pub sql: String,
    /// Deadline for the whole call
    #[serde(skip)]
    pub timeout: Duration,
}

impl QueryRequest {
    /// Create a new query request
    pub fn new(
        tablespace: impl Into<String>,
        version: i64,
        partition: u32,
        sql: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            tablespace: tablespace.into(),
            version,
            partition,
            sql: sql.into(),
            timeout,
        }
    }
}

/// Remote calls the query node issues against DNodes
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Run `request` on `node`, returning the JSON-serialized result rows
    async fn query(&self, node: &NodeAddress, request: &QueryRequest) -> Result<String, NodeError>;

    /// Ask `node` to drop the given tablespace versions
    async fn delete_old_versions(
        &self,
        node: &NodeAddress,
        versions: &[TablespaceVersion],
    ) -> Result<(), NodeError>;
}

/// DNode client speaking JSON over HTTP
pub struct HttpNodeClient {
    http: reqwest::Client,
    delete_timeout: Duration,
}

impl HttpNodeClient {
    /// Create a new client
    pub fn new(config: &ClientConfig) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| NodeError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            delete_timeout: config.delete_timeout(),
        })
    }

    /// Build the URL of `path` on `node`, defaulting to plain HTTP
    fn endpoint(node: &NodeAddress, path: &str) -> String {
        let base = node.as_str().trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{path}")
        } else {
            format!("http://{base}{path}")
        }
    }
}

fn classify(err: &reqwest::Error) -> NodeError {
    if err.is_timeout() {
        NodeError::Timeout
    } else {
        NodeError::Transport(err.to_string())
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, NodeError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| classify(&e))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(NodeError::Application(format!("{status}: {body}")))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn query(&self, node: &NodeAddress, request: &QueryRequest) -> Result<String, NodeError> {
        let url = Self::endpoint(node, "/api/v1/query");
        debug!(
            "Querying {} partition {} on {}",
            request.tablespace, request.partition, node
        );
        let response = self
            .http
            .post(url)
            .timeout(request.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        read_body(response).await
    }

    async fn delete_old_versions(
        &self,
        node: &NodeAddress,
        versions: &[TablespaceVersion],
    ) -> Result<(), NodeError> {
        let url = Self::endpoint(node, "/api/v1/delete-old-versions");
        let response = self
            .http
            .post(url)
            .timeout(self.delete_timeout)
            .json(versions)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        read_body(response).await.map(|_| ())
    }
}
