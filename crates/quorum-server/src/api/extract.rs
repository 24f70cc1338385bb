//! Request extractors whose rejections use the API error envelope.

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use quorum_core::error::FieldError;
use quorum_core::EngineError;

/// `Json<T>` whose malformed or mistyped bodies are rejected as
/// `InputValidationError` instead of axum's plain-text response.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(EngineError::InputValidation(vec![FieldError::new(
                "",
                rejection.body_text(),
            )])),
        }
    }
}
