//! REST API of the query node
//!
//! Query endpoints route through the directory; the node endpoints are how
//! DNodes publish what they serve to the in-process coordination service.

use crate::node::QNode;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use shardserve_client::CoordinationService;
use shardserve_common::{Error, NodeAddress, NodeEvent, ServingInfo, Tablespace, TablespaceVersion};
use shardserve_directory::QueryResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Error returned by API handlers
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self {
            status: StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: String,
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct SqlQuery {
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct MultiQuery {
    pub sql: String,
    /// Comma-separated shard list; all shards when absent
    pub shards: Option<String>,
}

/// One shard of a multi-partition response
#[derive(Debug, Serialize)]
pub struct PartitionResponse {
    pub shard: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TablespaceView {
    pub tablespace: String,
    #[serde(flatten)]
    pub snapshot: Tablespace,
}

#[derive(Debug, Serialize)]
pub struct Overview {
    pub served: BTreeMap<String, i64>,
    pub live_nodes: Vec<NodeAddress>,
    pub tablespaces: Vec<TablespaceView>,
}

#[derive(Debug, Serialize)]
pub struct DeliveryView {
    pub node: NodeAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SweepView {
    pub removed: Vec<TablespaceVersion>,
    pub deliveries: Vec<DeliveryView>,
}

/// Build the API router
pub fn router(node: Arc<QNode>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/query/{tablespace}", get(query_by_key))
        .route(
            "/api/partition-query/{tablespace}/{shard}",
            get(query_by_partition),
        )
        .route("/api/multi-query/{tablespace}", get(multi_query))
        .route("/api/overview", get(overview))
        .route("/api/nodes/{node}", post(publish_node).delete(remove_node))
        .route("/api/served/{tablespace}/{version}", put(set_served))
        .route("/api/sweep", post(sweep))
        .with_state(node)
}

async fn health() -> &'static str {
    "OK"
}

async fn query_by_key(
    State(node): State<Arc<QNode>>,
    Path(tablespace): Path<String>,
    Query(params): Query<KeyQuery>,
) -> ApiResult<Json<QueryResult>> {
    let mut rr = node.round_robins.checkout();
    let result = node
        .router
        .route_by_key(&mut rr, &tablespace, &params.key, &params.sql)
        .await?;
    Ok(Json(result))
}

async fn query_by_partition(
    State(node): State<Arc<QNode>>,
    Path((tablespace, shard)): Path<(String, u32)>,
    Query(params): Query<SqlQuery>,
) -> ApiResult<Json<QueryResult>> {
    let mut rr = node.round_robins.checkout();
    let result = node
        .router
        .route_by_partition(&mut rr, &tablespace, &params.sql, shard)
        .await?;
    Ok(Json(result))
}

fn parse_shards(list: &str) -> ApiResult<Vec<u32>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| ApiError::bad_request(format!("invalid shard: {s}")))
        })
        .collect()
}

async fn multi_query(
    State(node): State<Arc<QNode>>,
    Path(tablespace): Path<String>,
    Query(params): Query<MultiQuery>,
) -> ApiResult<Json<Vec<PartitionResponse>>> {
    let shards = params.shards.as_deref().map(parse_shards).transpose()?;
    let mut rr = node.round_robins.checkout();
    let outcomes = node
        .router
        .route_multi(&mut rr, &tablespace, &params.sql, shards.as_deref())
        .await?;

    let responses = outcomes
        .into_iter()
        .map(|outcome| match outcome.result {
            Ok(result) => PartitionResponse {
                shard: outcome.shard,
                result: Some(result),
                error: None,
            },
            Err(e) => PartitionResponse {
                shard: outcome.shard,
                result: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    Ok(Json(responses))
}

async fn overview(State(node): State<Arc<QNode>>) -> Json<Overview> {
    let tablespaces = node
        .directory
        .snapshot()
        .into_iter()
        .map(|(key, snapshot)| TablespaceView {
            tablespace: key.tablespace,
            snapshot: (*snapshot).clone(),
        })
        .collect();
    Json(Overview {
        served: node.directory.served_versions(),
        live_nodes: node.coordination.live_nodes().await,
        tablespaces,
    })
}

async fn publish_node(
    State(node): State<Arc<QNode>>,
    Path(address): Path<String>,
    Json(serving_info): Json<ServingInfo>,
) -> Json<serde_json::Value> {
    let event: NodeEvent = node
        .coordination
        .publish(NodeAddress::new(address), serving_info);
    Json(serde_json::json!({ "event": event }))
}

async fn remove_node(
    State(node): State<Arc<QNode>>,
    Path(address): Path<String>,
) -> ApiResult<StatusCode> {
    if node.coordination.leave(&NodeAddress::new(address.as_str())) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("unknown node: {address}")))
    }
}

async fn set_served(
    State(node): State<Arc<QNode>>,
    Path((tablespace, version)): Path<(String, i64)>,
) -> StatusCode {
    node.coordination.set_served_version(tablespace, version);
    StatusCode::NO_CONTENT
}

async fn sweep(State(node): State<Arc<QNode>>) -> Json<SweepView> {
    info!("Sweep requested over the API");
    let report = node.reaper.sweep().await;
    Json(SweepView {
        removed: report.removed,
        deliveries: report
            .deliveries
            .into_iter()
            .map(|d| DeliveryView {
                node: d.node,
                error: d.result.err().map(|e| e.to_string()),
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use shardserve_client::{NodeClient, NodeError, QueryRequest};
    use shardserve_common::{KeyKind, PartitionMetadata};
    use shardserve_common::config::QNodeConfig;
    use std::time::Duration;
    use tower::ServiceExt;

    struct EchoClient;

    #[async_trait]
    impl NodeClient for EchoClient {
        async fn query(&self, node: &NodeAddress, request: &QueryRequest) -> Result<String, NodeError> {
            Ok(format!(
                r#"[{{"node":"{node}","shard":{},"sql":"{}"}}]"#,
                request.partition, request.sql
            ))
        }

        async fn delete_old_versions(
            &self,
            _: &NodeAddress,
            _: &[TablespaceVersion],
        ) -> Result<(), NodeError> {
            Ok(())
        }
    }

    async fn started_node() -> Arc<QNode> {
        let settings = QNodeConfig {
            reap_interval_secs: 0,
            ..QNodeConfig::default()
        };
        let node = Arc::new(QNode::new(settings, Arc::new(EchoClient), Duration::from_secs(1)));
        for task in node.start().await {
            // Detached; the runtime shuts it down with the test
            drop(task);
        }
        node
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header("content-type", "application/json");
        }
        let request = request
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    async fn wait_for_served(node: &QNode, tablespace: &str, version: i64) {
        for _ in 0..200 {
            if node.directory.served_version(tablespace) == Some(version) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{tablespace} never served at {version}");
    }

    fn report_json() -> String {
        let report = ServingInfo::new()
            .with_partition("users", 1, 0, PartitionMetadata::new(None, Some("m".into()), 5))
            .with_partition("users", 1, 1, PartitionMetadata::new(Some("m".into()), None, 5));
        serde_json::to_string(&report).unwrap()
    }

    #[tokio::test]
    async fn test_publish_serve_and_query() {
        let node = started_node().await;
        let app = router(node.clone());

        let (status, body) = call(&app, Method::POST, "/api/nodes/d1:4422", Some(&report_json())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["event"], "JOIN");

        let (status, _) = call(&app, Method::PUT, "/api/served/users/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        wait_for_served(&node, "users", 1).await;

        let (status, body) = call(&app, Method::GET, "/api/query/users?key=zed&sql=SELECT%201", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["shard"], 1);
        assert_eq!(body["node"], "d1:4422");
        assert_eq!(body["rows"][0]["sql"], "SELECT 1");

        let (status, body) =
            call(&app, Method::GET, "/api/multi-query/users?sql=x&shards=1,5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["shard"], 1);
        assert!(body[0]["result"].is_object());
        assert!(body[1]["error"].is_string());

        let (status, body) = call(&app, Method::GET, "/api/overview", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["served"]["users"], 1);
        assert_eq!(body["tablespaces"][0]["tablespace"], "users");
        assert_eq!(body["live_nodes"][0], "d1:4422");
    }

    #[tokio::test]
    async fn test_errors_map_to_status_codes() {
        let node = started_node().await;
        let app = router(node);

        let (status, body) = call(&app, Method::GET, "/api/query/ghost?key=a&sql=x", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ghost"));

        let (status, _) = call(&app, Method::GET, "/api/multi-query/ghost?sql=x&shards=1,b", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::DELETE, "/api/nodes/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_int_keyed_tablespace_routes_by_value() {
        let node = started_node().await;
        let app = router(node.clone());
        let report = ServingInfo::new()
            .with_partition(
                "events",
                1,
                0,
                PartitionMetadata::new(None, Some("10".into()), 5).with_key_kind(KeyKind::Int),
            )
            .with_partition(
                "events",
                1,
                1,
                PartitionMetadata::new(Some("10".into()), None, 5).with_key_kind(KeyKind::Int),
            );
        let body = serde_json::to_string(&report).unwrap();

        call(&app, Method::POST, "/api/nodes/d1:4422", Some(&body)).await;
        call(&app, Method::PUT, "/api/served/events/1", None).await;
        wait_for_served(&node, "events", 1).await;

        let (status, body) = call(&app, Method::GET, "/api/query/events?key=9&sql=x", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["shard"], 0);

        let (status, body) = call(&app, Method::GET, "/api/query/events?key=100&sql=x", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["shard"], 1);

        let (status, body) = call(&app, Method::GET, "/api/query/events?key=ten&sql=x", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not a valid int key"));
    }

    #[tokio::test]
    async fn test_sweep_without_served_versions() {
        let node = started_node().await;
        let app = router(node);

        let (status, body) = call(&app, Method::POST, "/api/sweep", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], serde_json::json!([]));
    }

    #[test]
    fn test_parse_shards() {
        assert_eq!(parse_shards("1, 2,,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_shards("1,x").is_err());
    }
}
