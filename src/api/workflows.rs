/// Workflow management REST API endpoints
///
/// Provides CRUD operations for workflow definitions plus the two contact
/// operations of the orchestration layer: starting a workflow and
/// unsubscribing. Delivery itself happens on the scheduler's next tick.

use crate::api::ApiError;
use crate::workflow::{
    service::WorkflowService,
    types::{EmailEventTemplate, WorkflowDefinition},
    WorkflowBuilder,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Orchestration surface over the configured store
    pub service: WorkflowService,
}

/// Request body for workflow creation
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub email_events: Vec<EmailEventTemplate>,
}

/// Request body naming a contact by email
#[derive(Debug, Deserialize)]
pub struct ContactEmailRequest {
    pub email: String,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow).delete(delete_workflow))
        .route("/api/workflows/{id}/start", post(start_workflow))
        .route("/api/unsubscribe", post(unsubscribe))
}

/// Create a new workflow
///
/// POST /api/workflows
/// Body: { "name": "...", "description": "...", "email_events": [{ "send_delay_secs": 0, ... }] }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowDefinition>), ApiError> {
    let mut builder = WorkflowBuilder::new();
    builder.set_name(payload.name).set_description(payload.description);
    for event in payload.email_events {
        builder.add_email_event(event);
    }

    let workflow = state.service.save(&builder.build()?).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// GET /api/workflows
async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowDefinition>>, ApiError> {
    Ok(Json(state.service.list().await?))
}

/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    Ok(Json(state.service.retrieve(id).await?))
}

/// DELETE /api/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Enroll a contact in a stored workflow
///
/// POST /api/workflows/{id}/start
/// Body: { "email": "..." }
async fn start_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContactEmailRequest>,
) -> Result<Json<Value>, ApiError> {
    let events = state.service.start_by_id(id, &payload.email).await?;
    Ok(Json(json!({ "scheduled": events.len() })))
}

/// Remove every email event addressed to a contact
///
/// POST /api/unsubscribe
/// Body: { "email": "..." }
async fn unsubscribe(
    State(state): State<AppState>,
    Json(payload): Json<ContactEmailRequest>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.service.unsubscribe(&payload.email).await?;
    Ok(Json(json!({ "removed": removed })))
}
