//! Authenticated proxy to the external agent runtime.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use quorum_core::gateway::normalize_error_payload;
use quorum_core::EngineError;

use super::extract::ApiJson;
use crate::state::AppState;

const UNAVAILABLE: &str = "Agent service unavailable";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{agent_id}/text", post(agent_text))
        .route("/{agent_id}/stream", post(agent_stream))
}

/// POST /api/agents/{agent_id}/text — JSON pass-through.
async fn agent_text(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Response, EngineError> {
    let upstream = state
        .gateway
        .forward(&format!("/agents/{}/text", agent_id), &body)
        .await?;
    if !upstream.status().is_success() {
        return Ok(upstream_failure(&agent_id, upstream).await);
    }

    let status = status_of(&upstream);
    let data: serde_json::Value = upstream
        .json()
        .await
        .map_err(|e| EngineError::Gateway(format!("invalid agent response: {}", e)))?;
    Ok((status, Json(data)).into_response())
}

/// POST /api/agents/{agent_id}/stream — Server-sent events, relayed verbatim.
async fn agent_stream(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> Result<Response, EngineError> {
    let upstream = state
        .gateway
        .forward(&format!("/agents/{}/stream", agent_id), &body)
        .await?;
    if !upstream.status().is_success() {
        return Ok(upstream_failure(&agent_id, upstream).await);
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response())
}

fn status_of(response: &reqwest::Response) -> StatusCode {
    StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// Mirror the upstream status with a normalized error body.
async fn upstream_failure(agent_id: &str, upstream: reqwest::Response) -> Response {
    let status = status_of(&upstream);
    let raw = upstream.text().await.unwrap_or_default();
    tracing::error!("[Gateway] Agent {} returned {}: {}", agent_id, status, raw);

    (
        status,
        Json(serde_json::json!({
            "error": UNAVAILABLE,
            "details": normalize_error_payload(&raw),
            "upstreamStatus": status.as_u16(),
        })),
    )
        .into_response()
}
