//! API route definitions.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::heal::ResolveOutcome;

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/network/status", get(network_status))
        .route("/network/history", get(network_history))
        .route("/healing/issues", get(list_issues))
        .route("/healing/history", get(list_history))
        .route("/healing/resolve", post(resolve_issue))
        .with_state(state)
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": { "status": "ok" },
        "meta": meta()
    }))
}

async fn network_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.status.read().await.clone();
    Json(json!({ "data": status, "meta": meta() }))
}

async fn network_history(State(state): State<AppState>) -> Json<Value> {
    let history = state.status.read().await.metrics_history.clone();
    Json(json!({ "data": history, "meta": { "total": history.len() } }))
}

async fn list_issues(State(state): State<AppState>) -> Json<Value> {
    let issues = state.resolver.active_issues().await;
    Json(json!({ "data": issues, "meta": { "total": issues.len() } }))
}

async fn list_history(State(state): State<AppState>) -> Json<Value> {
    let history = state.resolver.history().await;
    Json(json!({ "data": history, "meta": { "total": history.len() } }))
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    issue_id: Uuid,
}

async fn resolve_issue(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> Json<ResolveOutcome> {
    Json(state.resolver.resolve_issue(request.issue_id).await)
}
