//! Core error type for the Quorum engine.
//!
//! `EngineError` is used throughout the core domain (chain, stores,
//! orchestration, gateway). Every variant carries a stable `kind()` string
//! that crosses the API boundary. When the `axum` feature is enabled, it
//! also implements `IntoResponse` so it can be used directly as an axum
//! handler error type.

use serde::{Deserialize, Serialize};

/// A single shape violation, addressed by JSON pointer (`""` is the root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A specialist that failed during a delegation fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationFailure {
    pub agent: String,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Input validation failed: {}", join_errors(.0))]
    InputValidation(Vec<FieldError>),

    #[error("Agent output did not satisfy the schema after {attempts} attempt(s): {}", join_errors(.errors))]
    SchemaValidationExhausted {
        attempts: u32,
        last_output: String,
        errors: Vec<FieldError>,
    },

    #[error("All {} delegated specialist(s) failed", .failures.len())]
    DelegationTotalFailure { failures: Vec<DelegationFailure> },

    #[error("Execution {execution_id} is {status} and cannot be resumed")]
    InvalidState { execution_id: String, status: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Step '{step_id}' failed: {source}")]
    ExecutionFailed {
        step_id: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Workflow result failed validation: {}", join_errors(.0))]
    ResultValidation(Vec<FieldError>),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("{0}")]
    Step(String),

    #[error("Agent call failed: {0}")]
    Agent(String),

    #[error("Agent runtime unavailable: {0}")]
    Gateway(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable, typed error kind exposed to API callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputValidation(_) => "InputValidationError",
            Self::SchemaValidationExhausted { .. } => "SchemaValidationExhausted",
            Self::DelegationTotalFailure { .. } => "DelegationTotalFailure",
            Self::InvalidState { .. } => "InvalidStateError",
            Self::NotFound(_) => "NotFoundError",
            Self::ExecutionFailed { .. } => "ExecutionFailedError",
            Self::ResultValidation(_) => "ResultValidationError",
            Self::InvariantViolation(_) => "InvariantViolation",
            Self::Step(_) => "StepError",
            Self::Agent(_) => "AgentError",
            Self::Gateway(_) => "GatewayError",
            Self::Unauthorized => "Unauthorized",
            Self::Database(_) => "DatabaseError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Wrap a step-level error so it is tagged with the originating step.
    pub fn in_step(self, step_id: &str) -> Self {
        match self {
            already @ Self::ExecutionFailed { .. } => already,
            other => Self::ExecutionFailed {
                step_id: step_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through `ExecutionFailed`.
    pub fn root_cause(&self) -> &EngineError {
        match self {
            Self::ExecutionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// JSON body for API callers. Storage and internal details stay in the logs.
    pub fn to_body(&self) -> serde_json::Value {
        let message = match self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::ExecutionFailed { source, .. }
                if matches!(source.root_cause(), Self::Database(_) | Self::Internal(_)) =>
            {
                "Execution failed".to_string()
            }
            other => other.to_string(),
        };

        let mut body = serde_json::json!({
            "error": message,
            "kind": self.kind(),
        });

        if let Self::ExecutionFailed { step_id, source } = self {
            body["stepId"] = serde_json::Value::String(step_id.clone());
            body["causeKind"] = serde_json::Value::String(source.root_cause().kind().to_string());
        }

        match self.root_cause() {
            Self::InputValidation(errors) | Self::ResultValidation(errors) => {
                body["details"] = serde_json::json!({ "errors": errors });
            }
            Self::SchemaValidationExhausted {
                attempts,
                last_output,
                errors,
            } => {
                body["details"] = serde_json::json!({
                    "attempts": attempts,
                    "lastOutput": last_output,
                    "errors": errors,
                });
            }
            Self::DelegationTotalFailure { failures } => {
                body["details"] = serde_json::json!({ "failures": failures });
            }
            _ => {}
        }

        body
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self.root_cause() {
            EngineError::InputValidation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidState { .. } => StatusCode::CONFLICT,
            EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngineError::Gateway(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::SchemaValidationExhausted { .. }
            | EngineError::DelegationTotalFailure { .. }
            | EngineError::ResultValidation(_)
            | EngineError::Step(_)
            | EngineError::Agent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::InvariantViolation(_)
            | EngineError::Database(_)
            | EngineError::Internal(_)
            | EngineError::ExecutionFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("[Api] {}", self);
        }

        (status, axum::Json(self.to_body())).into_response()
    }
}
