//! Control and query routes, exercised in-process with `tower::ServiceExt`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tidal_bus::{Bus, MemoryBus};
use tidal_orchestrator::{http, Orchestrator, OrchestratorConfig};
use tidal_store::RedbStore;
use tidal_types::{HeartbeatMessage, MetricsData, MetricsMessage, RegisterMessage, TopicNames, TriggerMessage};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct Api {
    _dir: TempDir,
    bus: Bus,
    orchestrator: Arc<Orchestrator>,
}

fn api() -> Api {
    api_with(0)
}

fn api_with(drivers: usize) -> Api {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RedbStore::open(dir.path()).unwrap());
    let bus = Bus::new(Arc::new(MemoryBus::new()), TopicNames::default());
    let config = OrchestratorConfig {
        drivers,
        settle_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(bus.clone(), store, config));
    Api {
        _dir: dir,
        bus,
        orchestrator,
    }
}

async fn call(api: &Api, request: Request<Body>) -> (StatusCode, Value) {
    let response = http::router(api.orchestrator.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn register(api: &Api, node_id: &str) {
    api.orchestrator
        .handle_register(RegisterMessage::new(node_id, "10.0.0.1"))
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_all_nodes_before_any_registration_is_a_store_error() {
    let api = api();
    let (status, body) = call(&api, get("/all-nodes")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("register"));
}

#[tokio::test]
async fn test_all_nodes_lists_registrations() {
    let api = api();
    register(&api, "n1").await;
    register(&api, "n2").await;

    let (status, body) = call(&api, get("/all-nodes")).await;
    assert_eq!(status, StatusCode::OK);
    let nodes = body.as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["node_id"], "n1");
    assert_eq!(nodes[0]["node_IP"], "10.0.0.1");
    assert_eq!(nodes[0]["message_type"], "DRIVER_NODE_REGISTER");
}

#[tokio::test]
async fn test_metrics_routes() {
    let api = api();
    register(&api, "n1").await;
    register(&api, "n2").await;
    let report = MetricsMessage::new("n1", "run-1", MetricsData::default());
    api.orchestrator.handle_metrics(report.clone()).await.unwrap();

    let (status, body) = call(&api, get("/metrics/n1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report_id"], report.report_id.as_str());

    let (status, _) = call(&api, get("/metrics/n2")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // Nodes without metrics are skipped
    let (status, body) = call(&api, get("/all-metrics")).await;
    assert_eq!(status, StatusCode::OK);
    let all = body["metrics"].as_array().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["node_id"], "n1");
}

#[tokio::test]
async fn test_heartbeat_history_and_node_status() {
    let api = api();
    register(&api, "n1").await;
    api.orchestrator
        .handle_heartbeat(HeartbeatMessage::now("n1"))
        .await
        .unwrap();
    api.orchestrator
        .handle_heartbeat(HeartbeatMessage::now("n1"))
        .await
        .unwrap();

    let (status, body) = call(&api, get("/heartbeat/n1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["heartbeat"], "YES");

    let (status, body) = call(&api, get("/node-status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["node_id"], "n1");
    assert_eq!(body[0]["status"], "ALIVE");
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_trigger_publishes_and_persists_config() {
    let api = api();
    let mut triggers = api.bus.subscribe::<TriggerMessage>().await.unwrap();

    let (status, body) = call(
        &api,
        post_json(
            "/trigger-load-test",
            serde_json::json!({
                "test_type": "avalanche",
                "test_server": "http://target:8080/ping",
                "test_message_delay": 0,
                "message_count_per_driver": 10
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Load test triggered successfully");
    let test_id = body["test_id"].as_str().unwrap().to_string();

    let trigger = triggers.next().await.unwrap().unwrap();
    assert_eq!(trigger.test_id, test_id);

    let (status, body) = call(&api, get("/test-config")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["test_id"], test_id.as_str());
    assert_eq!(body[0]["test_type"], "AVALANCHE");
    assert_eq!(body[0]["test_server"], "http://target:8080/ping");
}

#[tokio::test]
async fn test_trigger_rejects_unknown_test_type() {
    let api = api();
    let (status, body) = call(
        &api,
        post_json(
            "/trigger-load-test",
            serde_json::json!({
                "test_type": "EARTHQUAKE",
                "test_message_delay": 0,
                "message_count_per_driver": 1
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("EARTHQUAKE"));
}

#[tokio::test]
async fn test_trigger_requires_message_count() {
    let api = api();
    let (status, _) = call(
        &api,
        post_json(
            "/trigger-load-test",
            serde_json::json!({ "test_type": "TSUNAMI", "test_message_delay": 100 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn avalanche_body() -> Value {
    serde_json::json!({
        "test_type": "AVALANCHE",
        "test_server": "http://target:8080/ping",
        "test_message_delay": 0,
        "message_count_per_driver": 3
    })
}

#[tokio::test]
async fn test_trigger_is_refused_until_quorum() {
    let api = api_with(2);
    let mut registrations = api.bus.subscribe::<RegisterMessage>().await.unwrap();
    let mut triggers = api.bus.subscribe::<TriggerMessage>().await.unwrap();

    let (status, body) = call(&api, post_json("/trigger-load-test", avalanche_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("0/2"));
    assert!(!api.orchestrator.quorum_reached());

    // Nothing went out and nothing was persisted
    assert!(
        tokio::time::timeout(Duration::from_millis(100), triggers.next())
            .await
            .is_err()
    );
    let (status, _) = call(&api, get("/test-config")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    for node in ["n1", "n2"] {
        api.bus
            .publish_one(&RegisterMessage::new(node, "10.0.0.1"))
            .await;
    }
    let shutdown = CancellationToken::new();
    assert!(api
        .orchestrator
        .await_registrations(&mut registrations, &shutdown)
        .await
        .unwrap());
    let _tasks = api
        .orchestrator
        .clone()
        .start(registrations, &shutdown)
        .await
        .unwrap();
    assert!(api.orchestrator.quorum_reached());

    let (status, body) = call(&api, post_json("/trigger-load-test", avalanche_body())).await;
    assert_eq!(status, StatusCode::OK);
    let trigger = triggers.next().await.unwrap().unwrap();
    assert_eq!(trigger.test_id, body["test_id"].as_str().unwrap());

    shutdown.cancel();
}
