//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use conductor_core::workflow::WorkflowError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Workflow engine errors.
    Workflow(WorkflowError),
    /// Requested resource (other than a workflow) does not exist.
    NotFound(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Workflow(e @ WorkflowError::InvalidDefinition(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_DEFINITION", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::AlreadyRunning(_)) => {
                (StatusCode::CONFLICT, "ALREADY_RUNNING", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::TemplateNotFound(_)) => {
                (StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::InvalidCheckpointName(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::ParseError(_)) => {
                (StatusCode::BAD_REQUEST, "PARSE_ERROR", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
