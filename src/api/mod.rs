/// HTTP API Layer
///
/// REST endpoints over the workflow service:
/// - Workflow definition CRUD
/// - Starting a workflow for a contact and unsubscribing a contact
/// - Minimal contact registration

// Workflow management endpoints (POST/GET/DELETE, start, unsubscribe)
pub mod workflows;

// Contact registration endpoint
pub mod contacts;

use crate::error::WorkflowError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

// Re-export router builders
pub use contacts::create_contact_routes;
pub use workflows::{create_workflow_routes, AppState};

/// Error wrapper mapping the error taxonomy onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(pub WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::Store(_) | WorkflowError::Send(_) => {
                tracing::error!("❌ Request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
