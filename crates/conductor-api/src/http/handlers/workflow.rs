//! Workflow lifecycle handlers for the REST API.
//!
//! Endpoints for creating workflows, starting and cancelling runs,
//! inspecting run state, and managing named checkpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use conductor_core::workflow::WorkflowError;
use conductor_core::workflow::definition::WorkflowSpec;
use conductor_types::workflow::{
    Checkpoint, RunState, StepDefinition, ValueMap, WorkflowDefinition, WorkflowId,
    WorkflowStatistics, WorkflowStatus,
};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of `POST /workflows/{id}/checkpoints`.
#[derive(Debug, Deserialize)]
pub struct CreateCheckpointRequest {
    pub name: String,
    #[serde(default)]
    pub payload: ValueMap,
}

/// Definition plus live status, returned by `GET /workflows/{id}`.
#[derive(Debug, Serialize)]
pub struct WorkflowDetail {
    pub status: WorkflowStatus,
    pub definition: Arc<WorkflowDefinition>,
}

/// Summary plus the full run state, returned by `GET /workflows/{id}/status`.
#[derive(Debug, Serialize)]
pub struct WorkflowRunDetail {
    pub status: WorkflowStatus,
    pub run: RunState,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the workflow sub-router.
///
/// Mounted at `/api/v1` by the main router.
pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", post(create_workflow).get(list_workflows))
        .route("/workflows/{id}", get(get_workflow).delete(delete_workflow))
        .route("/workflows/{id}/status", get(get_workflow_status))
        .route("/workflows/{id}/plan", get(get_execution_plan))
        .route("/workflows/{id}/execute", post(execute_workflow))
        .route("/workflows/{id}/cancel", post(cancel_workflow))
        .route(
            "/workflows/{id}/checkpoints",
            get(list_checkpoints).post(create_checkpoint),
        )
        .route(
            "/workflows/{id}/checkpoints/{name}",
            get(restore_checkpoint).delete(delete_checkpoint),
        )
        .route("/stats", get(get_stats))
        .route("/nodes", get(list_nodes))
}

fn self_link(id: WorkflowId) -> String {
    format!("/api/v1/workflows/{id}")
}

// ---------------------------------------------------------------------------
// Workflow CRUD
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows - Validate and register a new workflow.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<WorkflowSpec>,
) -> Result<(StatusCode, Json<ApiResponse<WorkflowStatus>>), AppError> {
    let start = Instant::now();
    let service = &state.workflow_service;

    let id = service
        .create_workflow(&body.name, &body.description, body.steps, body.dependencies)
        .await?;
    let status = service
        .get_workflow_status(id)
        .ok_or(WorkflowError::NotFound(id))?;

    let resp = ApiResponse::timed(status, start)
        .with_link("self", &self_link(id))
        .with_link("execute", &format!("{}/execute", self_link(id)));
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/workflows - Status of every known workflow.
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<WorkflowStatus>>> {
    let start = Instant::now();
    let list = state.workflow_service.engine().list_workflows();
    Json(ApiResponse::timed(list, start).with_link("self", "/api/v1/workflows"))
}

/// GET /api/v1/workflows/{id} - Definition and status.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
) -> Result<Json<ApiResponse<WorkflowDetail>>, AppError> {
    let start = Instant::now();
    let engine = state.workflow_service.engine();

    let definition = engine.get_definition(id).ok_or(WorkflowError::NotFound(id))?;
    let status = engine
        .get_workflow_status(id)
        .ok_or(WorkflowError::NotFound(id))?;

    let resp = ApiResponse::timed(WorkflowDetail { status, definition }, start)
        .with_link("self", &self_link(id))
        .with_link("status", &format!("{}/status", self_link(id)));
    Ok(Json(resp))
}

/// DELETE /api/v1/workflows/{id} - Remove a workflow and everything stored for it.
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let deleted = state.workflow_service.engine().delete_workflow(id).await?;
    if !deleted {
        return Err(WorkflowError::NotFound(id).into());
    }
    Ok(Json(ApiResponse::timed(
        serde_json::json!({ "workflow_id": id, "deleted": true }),
        start,
    )))
}

// ---------------------------------------------------------------------------
// Status and planning
// ---------------------------------------------------------------------------

/// GET /api/v1/workflows/{id}/status - Summary plus full run state.
pub async fn get_workflow_status(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
) -> Result<Json<ApiResponse<WorkflowRunDetail>>, AppError> {
    let start = Instant::now();
    let engine = state.workflow_service.engine();

    let status = engine
        .get_workflow_status(id)
        .ok_or(WorkflowError::NotFound(id))?;
    let run = engine.get_run_state(id).ok_or(WorkflowError::NotFound(id))?;

    Ok(Json(
        ApiResponse::timed(WorkflowRunDetail { status, run }, start)
            .with_link("workflow", &self_link(id)),
    ))
}

/// GET /api/v1/workflows/{id}/plan - Parallel execution waves.
pub async fn get_execution_plan(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
) -> Result<Json<ApiResponse<Vec<Vec<StepDefinition>>>>, AppError> {
    let start = Instant::now();
    let waves = state.workflow_service.engine().execution_plan(id)?;
    Ok(Json(ApiResponse::timed(waves, start)))
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows/{id}/execute - Start a run in the background.
///
/// Responds `202 Accepted` immediately; poll `/status` for progress.
pub async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
) -> Result<(StatusCode, Json<ApiResponse<WorkflowStatus>>), AppError> {
    let start = Instant::now();
    let engine = Arc::clone(state.workflow_service.engine());

    // Claim the run slot before responding so a concurrent request gets 409.
    let reservation = engine.reserve_run(id).await?;

    let runner = Arc::clone(&engine);
    tokio::spawn(async move {
        match runner.run_reserved(reservation).await {
            Ok(completed) => {
                tracing::info!(workflow_id = %id, completed, "background run finished");
            }
            Err(e) => {
                tracing::warn!(workflow_id = %id, error = %e, "background run failed");
            }
        }
    });

    let status = engine
        .get_workflow_status(id)
        .ok_or(WorkflowError::NotFound(id))?;
    let resp = ApiResponse::timed(status, start)
        .with_link("status", &format!("{}/status", self_link(id)))
        .with_link("cancel", &format!("{}/cancel", self_link(id)));
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// POST /api/v1/workflows/{id}/cancel - Request cancellation of a running workflow.
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let cancelled = state.workflow_service.engine().cancel_workflow(id)?;
    Ok(Json(ApiResponse::timed(
        serde_json::json!({ "workflow_id": id, "cancellation_requested": cancelled }),
        start,
    )))
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// GET /api/v1/workflows/{id}/checkpoints
pub async fn list_checkpoints(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
) -> Result<Json<ApiResponse<Vec<Checkpoint>>>, AppError> {
    let start = Instant::now();
    let checkpoints = state.workflow_service.engine().list_checkpoints(id).await?;
    Ok(Json(ApiResponse::timed(checkpoints, start)))
}

/// POST /api/v1/workflows/{id}/checkpoints - Store (or replace) a named checkpoint.
pub async fn create_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
    Json(body): Json<CreateCheckpointRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Checkpoint>>), AppError> {
    let start = Instant::now();
    let checkpoint = state
        .workflow_service
        .engine()
        .create_checkpoint(id, &body.name, body.payload)
        .await?;
    let link = format!("{}/checkpoints/{}", self_link(id), checkpoint.name);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::timed(checkpoint, start).with_link("self", &link)),
    ))
}

/// GET /api/v1/workflows/{id}/checkpoints/{name} - Payload of a named checkpoint.
pub async fn restore_checkpoint(
    State(state): State<AppState>,
    Path((id, name)): Path<(WorkflowId, String)>,
) -> Result<Json<ApiResponse<ValueMap>>, AppError> {
    let start = Instant::now();
    let payload = state
        .workflow_service
        .engine()
        .restore_checkpoint(id, &name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("checkpoint '{name}' not found")))?;
    Ok(Json(ApiResponse::timed(payload, start)))
}

/// DELETE /api/v1/workflows/{id}/checkpoints/{name}
pub async fn delete_checkpoint(
    State(state): State<AppState>,
    Path((id, name)): Path<(WorkflowId, String)>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let deleted = state
        .workflow_service
        .engine()
        .delete_checkpoint(id, &name)
        .await?;
    if !deleted {
        return Err(AppError::NotFound(format!("checkpoint '{name}' not found")));
    }
    Ok(Json(ApiResponse::timed(
        serde_json::json!({ "workflow_id": id, "name": name, "deleted": true }),
        start,
    )))
}

// ---------------------------------------------------------------------------
// Engine-wide
// ---------------------------------------------------------------------------

/// GET /api/v1/stats - Aggregate workflow statistics.
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<WorkflowStatistics>> {
    let start = Instant::now();
    let stats = state.workflow_service.get_workflow_statistics();
    Json(ApiResponse::timed(stats, start))
}

/// GET /api/v1/nodes - Registered node types.
pub async fn list_nodes(State(state): State<AppState>) -> Json<ApiResponse<Vec<String>>> {
    let start = Instant::now();
    let nodes = state
        .workflow_service
        .engine()
        .registry()
        .available_nodes()
        .into_iter()
        .map(str::to_string)
        .collect();
    Json(ApiResponse::timed(nodes, start))
}
