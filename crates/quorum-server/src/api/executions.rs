use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use quorum_core::models::ExecutionRecord;
use quorum_core::EngineError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_executions))
        .route("/{id}", get(get_execution))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    workflow_id: Option<String>,
}

/// GET /api/executions — Newest first, optionally for one workflow.
async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, EngineError> {
    let executions = state.engine.list(query.workflow_id.as_deref()).await?;
    Ok(Json(serde_json::json!({ "executions": executions })))
}

/// GET /api/executions/{id}
async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionRecord>, EngineError> {
    state
        .engine
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| EngineError::NotFound(format!("execution '{}'", id)))
}
