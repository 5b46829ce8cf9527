//! Admin HTTP API for the coordinator
//!
//! Read-only endpoints for operators and monitoring:
//! - `/health/live`, `/health/ready` (ready once the first cycle completes)
//! - `/metrics` (Prometheus text)
//! - `/v1/status`, `/v1/servers`, `/v1/stats`

use crate::common::METRICS;
use crate::coordinator::runner::CoordinatorStatus;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::{Arc, RwLock};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AdminState {
    pub status: Arc<RwLock<CoordinatorStatus>>,
}

pub fn create_router(state: AdminState) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/metrics", get(metrics))
        .route("/v1/status", get(status))
        .route("/v1/servers", get(servers))
        .route("/v1/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_live() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn health_ready(State(state): State<AdminState>) -> impl IntoResponse {
    let ready = state.status.read().map(|s| s.ready).unwrap_or(false);
    if ready {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "waiting for first cycle" })),
        )
    }
}

async fn metrics() -> impl IntoResponse {
    METRICS.to_prometheus()
}

async fn status(State(state): State<AdminState>) -> impl IntoResponse {
    match state.status.read() {
        Ok(status) => Json(json!({
            "phase": status.phase,
            "cycles_completed": status.cycles_completed,
            "ready": status.ready,
            "last_report": status.last_report,
        }))
        .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn servers(State(state): State<AdminState>) -> impl IntoResponse {
    match state.status.read() {
        Ok(status) => Json(status.servers.clone()).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn stats(State(state): State<AdminState>) -> impl IntoResponse {
    match state.status.read() {
        Ok(status) => {
            let stats = status.last_report.as_ref().map(|r| r.stats.clone());
            Json(stats).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::runner::CoordinatorStatus;

    fn state() -> AdminState {
        AdminState {
            status: Arc::new(RwLock::new(CoordinatorStatus::default())),
        }
    }

    #[tokio::test]
    async fn test_ready_flips_after_first_cycle() {
        let state = state();
        let response = health_ready(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.status.write().unwrap().ready = true;
        let response = health_ready(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
