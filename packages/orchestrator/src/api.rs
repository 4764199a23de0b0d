//! Orchestrator's own axum HTTP surface, independently deployable from the
//! gateway and exercised in integration tests via [`crate::runtime::FakeRuntime`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use gateway_core::error::GatewayError;
use gateway_core::worker::Worker;
use serde::{Deserialize, Serialize};

use crate::service::OrchestratorService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrchestratorService>,
    pub grace_period: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/containers/provision", post(provision))
        .route("/containers/{id}", delete(delete_container))
        .route("/containers/sync", get(sync_containers))
        .route("/heartbeat", post(heartbeat))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ProvisionRequest {
    function_name: String,
    #[serde(default = "default_count")]
    count: u32,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    #[allow(dead_code)]
    request_id: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Serialize)]
struct ProvisionResponse {
    workers: Vec<Worker>,
}

async fn provision(
    State(state): State<AppState>,
    Json(body): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>, GatewayError> {
    if body.dry_run {
        return Ok(Json(ProvisionResponse { workers: Vec::new() }));
    }
    let workers = state
        .service
        .provision(&body.function_name, body.count, body.image.as_deref(), body.env)
        .await?;
    Ok(Json(ProvisionResponse { workers }))
}

async fn delete_container(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, GatewayError> {
    state.service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    containers: Vec<Worker>,
}

async fn sync_containers(State(state): State<AppState>) -> Result<Json<SyncResponse>, GatewayError> {
    let containers = state.service.list().await?;
    Ok(Json(SyncResponse { containers }))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    function_name: String,
    container_names: Vec<String>,
}

/// Every heartbeat from the gateway doubles as a reconciliation trigger:
/// any worker in `function_name`'s namespace not named in this report, and
/// old enough to be past the grace period, is reaped.
async fn heartbeat(State(state): State<AppState>, Json(body): Json<HeartbeatRequest>) -> StatusCode {
    state
        .service
        .reconcile(&body.function_name, &body.container_names, state.grace_period)
        .await;
    StatusCode::OK
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}
