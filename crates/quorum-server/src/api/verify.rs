use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use quorum_core::gateway::{VerifyReport, DEFAULT_VERIFY_AGENTS};
use quorum_core::EngineError;

use super::extract::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(verify))
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    input: String,
    #[serde(default)]
    agents: Vec<String>,
}

/// POST /api/verify — Ask several runtime agents the same question.
async fn verify(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<VerifyRequest>,
) -> Result<Json<VerifyReport>, EngineError> {
    if body.input.trim().is_empty() {
        return Err(EngineError::InputValidation(vec![
            quorum_core::error::FieldError::new("/input", "must not be empty"),
        ]));
    }
    let agents = if body.agents.is_empty() {
        DEFAULT_VERIFY_AGENTS.iter().map(|a| a.to_string()).collect()
    } else {
        body.agents
    };
    Ok(Json(state.gateway.verify(&body.input, &agents).await))
}
