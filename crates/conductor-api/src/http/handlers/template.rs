//! Template catalog handlers.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use conductor_core::workflow::WorkflowError;
use conductor_types::template::{Template, TemplateInstantiation, TemplateSummary};
use conductor_types::workflow::ValueMap;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for listing templates.
#[derive(Debug, Deserialize)]
pub struct ListTemplatesQuery {
    pub category: Option<String>,
}

/// Body of `POST /templates/{key}/instantiate`.
#[derive(Debug, Default, Deserialize)]
pub struct InstantiateRequest {
    /// Values for the template's `{{ placeholder }}` parameters.
    #[serde(default)]
    pub inputs: ValueMap,
}

pub fn template_routes() -> Router<AppState> {
    Router::new()
        .route("/templates", get(list_templates))
        .route("/templates/categories", get(list_categories))
        .route("/templates/{key}", get(get_template))
        .route("/templates/{key}/instantiate", post(instantiate_template))
}

/// GET /api/v1/templates[?category=...]
pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<ListTemplatesQuery>,
) -> Json<ApiResponse<Vec<TemplateSummary>>> {
    let start = Instant::now();
    let templates = state
        .workflow_service
        .list_templates(query.category.as_deref());
    Json(ApiResponse::timed(templates, start).with_link("self", "/api/v1/templates"))
}

/// GET /api/v1/templates/categories
pub async fn list_categories(State(state): State<AppState>) -> Json<ApiResponse<Vec<String>>> {
    let start = Instant::now();
    Json(ApiResponse::timed(state.workflow_service.get_categories(), start))
}

/// GET /api/v1/templates/{key} - Full template, steps included.
pub async fn get_template(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<Template>>, AppError> {
    let start = Instant::now();
    let template = state
        .workflow_service
        .catalog()
        .get_template(&key)
        .cloned()
        .ok_or(WorkflowError::TemplateNotFound(key))?;
    Ok(Json(ApiResponse::timed(template, start)))
}

/// POST /api/v1/templates/{key}/instantiate - Create a workflow from a template.
pub async fn instantiate_template(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<InstantiateRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<TemplateInstantiation>>), AppError> {
    let start = Instant::now();
    let Json(body) = body.unwrap_or_default();

    let created = state
        .workflow_service
        .create_workflow_from_template(&key, &body.inputs)
        .await?;
    let link = format!("/api/v1/workflows/{}", created.workflow_id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::timed(created, start).with_link("workflow", &link)),
    ))
}
