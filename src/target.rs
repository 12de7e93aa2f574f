//! Stand-in target server for local exercises.
//!
//! `GET /ping` answers `{"message":"pong"}` after a fixed delay, which makes
//! the difference between an avalanche burst and a tsunami pace visible in
//! the latency numbers.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub fn router(delay: Duration) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .with_state(delay)
}

async fn ping(State(delay): State<Duration>) -> Json<Value> {
    debug!("ping");
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    Json(json!({ "message": "pong" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Serve the target until `shutdown` fires.
pub async fn serve(listen: SocketAddr, delay: Duration, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!("Target server listening on {} (delay {:?})", listener.local_addr()?, delay);
    axum::serve(listener, router(delay))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_ping() {
        let (status, body) = get_json(router(Duration::ZERO), "/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "pong");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_waits_for_delay() {
        let start = tokio::time::Instant::now();
        let (status, _) = get_json(router(Duration::from_secs(1)), "/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(router(Duration::from_secs(60)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
