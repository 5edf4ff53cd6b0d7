use apex_agent::AgentError;
use apex_core::error::CoreError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`AgentError`] for pipeline
/// failures. Storage errors arrive inside [`AgentError::Storage`]. Implements [`IntoResponse`] to produce consistent
/// `{ "error", "code" }` JSON bodies; clients match on `code`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `apex_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failure inside the patch pipeline.
    #[error(transparent)]
    Agent(AgentError),

    /// A request body that could not be decoded.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Core(core) => AppError::Core(core),
            other => AppError::Agent(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => classify_core_error(core),

            // --- Pipeline errors ---
            AppError::Agent(err) => classify_agent_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// Classify a pipeline error into an HTTP status, error code, and message.
///
/// Generation and validation failures carry the formatted validation
/// message so the owner can see why the model's patch was rejected.
/// Upstream (LLM, GitHub) failures map to 502; local faults to a sanitized
/// 500.
fn classify_agent_error(err: &AgentError) -> (StatusCode, &'static str, String) {
    match err {
        AgentError::Core(core) => classify_core_error(core),
        AgentError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Patch with id {id} not found"),
        ),
        AgentError::GenerationFailed { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "GENERATION_FAILED",
            err.to_string(),
        ),
        AgentError::InvalidPatch(msg) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PATCH", msg.clone())
        }
        AgentError::Apply(msg) => {
            tracing::error!(error = %msg, "Patch application failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "APPLY_FAILED", msg.clone())
        }
        AgentError::RollbackUnavailable(_) => {
            (StatusCode::CONFLICT, "ROLLBACK_UNAVAILABLE", err.to_string())
        }
        AgentError::Llm(_) | AgentError::SourceControl(_) => {
            tracing::error!(error = %err, "Upstream service error");
            (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
        }
        AgentError::Config(_)
        | AgentError::Io(_)
        | AgentError::Json(_)
        | AgentError::Storage(_) => {
            tracing::error!(error = %err, "Agent error");
            internal()
        }
    }
}
