//! JSON control and query surface.
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | GET | `/all-nodes` | every registration, in arrival order |
//! | POST | `/trigger-load-test` | `{"message", "test_id"}` once the trigger is out, 503 before quorum |
//! | GET | `/test-config` | configs of the last run |
//! | GET | `/metrics/:nodeid` | latest metrics of one node |
//! | GET | `/all-metrics` | `{"metrics": [...]}` for every registered node |
//! | GET | `/heartbeat/:nodeid` | heartbeat history of one node |
//! | GET | `/node-status` | in-memory registry with liveness |

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tidal_types::{HeartbeatMessage, MetricsMessage, RegisterMessage, TestConfigMessage, TestType};
use tracing::error;

use crate::error::Error;
use crate::orchestrator::{LoadTestRequest, Orchestrator};
use crate::registry::NodeView;

/// Error body returned by every handler: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::Publish { .. } => StatusCode::BAD_GATEWAY,
            Error::QuorumNotReached { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Body of `POST /trigger-load-test`.
#[derive(Debug, Deserialize)]
pub struct TriggerBody {
    pub test_type: String,
    #[serde(default)]
    pub test_server: String,
    pub test_message_delay: u64,
    pub message_count_per_driver: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub message: String,
    pub test_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub metrics: Vec<MetricsMessage>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/all-nodes", get(all_nodes))
        .route("/trigger-load-test", post(trigger_load_test))
        .route("/test-config", get(test_config))
        .route("/metrics/:nodeid", get(node_metrics))
        .route("/all-metrics", get(all_metrics))
        .route("/heartbeat/:nodeid", get(node_heartbeats))
        .route("/node-status", get(node_status))
        .with_state(orchestrator)
}

async fn all_nodes(State(orchestrator): State<Arc<Orchestrator>>) -> ApiResult<Vec<RegisterMessage>> {
    Ok(Json(orchestrator.registrations().await?))
}

async fn trigger_load_test(
    State(orchestrator): State<Arc<Orchestrator>>,
    body: Result<Json<TriggerBody>, JsonRejection>,
) -> ApiResult<TriggerResponse> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let test_type: TestType = body
        .test_type
        .parse()
        .map_err(|e: tidal_types::CodecError| ApiError::bad_request(e.to_string()))?;

    let outcome = orchestrator
        .trigger_load_test(LoadTestRequest {
            test_type,
            test_server: body.test_server,
            test_message_delay: body.test_message_delay,
            message_count_per_driver: body.message_count_per_driver,
        })
        .await?;

    Ok(Json(TriggerResponse {
        message: "Load test triggered successfully".to_string(),
        test_id: outcome.test_id,
    }))
}

async fn test_config(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> ApiResult<Vec<TestConfigMessage>> {
    Ok(Json(orchestrator.test_configs().await?))
}

async fn node_metrics(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(node_id): Path<String>,
) -> ApiResult<MetricsMessage> {
    Ok(Json(orchestrator.metrics_for(&node_id).await?))
}

async fn all_metrics(State(orchestrator): State<Arc<Orchestrator>>) -> ApiResult<MetricsResponse> {
    let metrics = orchestrator.all_metrics().await?;
    Ok(Json(MetricsResponse { metrics }))
}

async fn node_heartbeats(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(node_id): Path<String>,
) -> ApiResult<Vec<HeartbeatMessage>> {
    Ok(Json(orchestrator.heartbeats_for(&node_id).await?))
}

async fn node_status(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Vec<NodeView>> {
    Json(orchestrator.registry().snapshot())
}
