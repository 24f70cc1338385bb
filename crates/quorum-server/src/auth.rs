//! Bearer-token gate for the API.
//!
//! Every rejection gets the same body, whether the header was missing,
//! malformed, or carried the wrong token.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use quorum_core::EngineError;

/// Shared secret the gate compares against.
#[derive(Clone)]
pub struct ApiSecret(Arc<str>);

impl ApiSecret {
    pub fn new(secret: &str) -> Self {
        Self(Arc::from(secret))
    }

    fn matches(&self, presented: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), presented.as_bytes())
    }
}

/// Middleware that rejects requests without `Authorization: Bearer <secret>`.
pub async fn require_bearer(
    State(secret): State<ApiSecret>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if !token.is_empty() && secret.matches(token) => next.run(request).await,
        _ => {
            tracing::debug!("[Auth] Rejected {} {}", request.method(), request.uri().path());
            EngineError::Unauthorized.into_response()
        }
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(expected: &[u8], presented: &[u8]) -> bool {
    let mut diff = expected.len() ^ presented.len();
    for (i, byte) in expected.iter().enumerate() {
        let other = presented.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}
