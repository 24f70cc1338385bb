use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use quorum_core::workflow::definition::WorkflowSummary;
use quorum_core::{EngineError, ExecutionResult};

use super::extract::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows))
        .route("/resume", post(resume_workflow))
        .route("/{id}/execute", post(execute_workflow))
}

/// GET /api/workflows — Registered workflows with their shapes.
async fn list_workflows(State(state): State<AppState>) -> Json<serde_json::Value> {
    let workflows: Vec<WorkflowSummary> = state
        .engine
        .definitions()
        .iter()
        .map(|w| w.summary())
        .collect();
    Json(serde_json::json!({ "workflows": workflows }))
}

/// POST /api/workflows/{id}/execute — Run a workflow on the request body.
async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<serde_json::Value>,
) -> Result<Json<ExecutionResult>, EngineError> {
    let result = state.engine.run(&id, input).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResumeRequest {
    execution_id: String,
    #[serde(default)]
    resume_payload: serde_json::Value,
}

/// POST /api/workflows/resume — Continue a suspended execution.
async fn resume_workflow(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResumeRequest>,
) -> Result<Json<ExecutionResult>, EngineError> {
    let result = state
        .engine
        .resume(&body.execution_id, body.resume_payload)
        .await?;
    Ok(Json(result))
}
