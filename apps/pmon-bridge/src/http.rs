//! 运维 HTTP 接口（可选，配置 BRIDGE_HTTP_ADDR 后启用）。
//!
//! - GET /health
//! - GET /metrics

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
};
use pmon_ingest::SessionState;
use pmon_telemetry::metrics;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
struct OpsState {
    session: watch::Receiver<SessionState>,
}

pub fn router(session: watch::Receiver<SessionState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .with_state(OpsState { session })
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<OpsState>) -> Response {
    let mqtt = state.session.borrow().as_str();
    Json(serde_json::json!({ "ok": true, "mqtt": mqtt })).into_response()
}

async fn get_metrics() -> Response {
    Json(metrics().snapshot()).into_response()
}

/// 监听 `addr` 直到收到关闭信号。
pub async fn serve(
    addr: &str,
    session: watch::Receiver<SessionState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(target: "pmon.bridge", addr = %addr, "ops_http_listening");
    axum::serve(listener, router(session))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;
    info!(target: "pmon.bridge", "ops_http_stopped");
    Ok(())
}
