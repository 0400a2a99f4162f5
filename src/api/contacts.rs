/// Contact registration endpoint
///
/// Workflows can only be started for known contacts, so the API exposes the
/// one contact operation the orchestration layer depends on.

use crate::api::{workflows::AppState, ApiError};
use crate::workflow::types::Contact;
use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde::Deserialize;

/// Request body for contact registration
#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
}

pub fn create_contact_routes() -> Router<AppState> {
    Router::new().route("/api/contacts", post(create_contact))
}

/// POST /api/contacts
/// Body: { "first_name": "...", "last_name": "...", "email": "..." }
async fn create_contact(
    State(state): State<AppState>,
    Json(payload): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let contact = state
        .service
        .register_contact(&payload.first_name, &payload.last_name, &payload.email)
        .await?;
    Ok((StatusCode::CREATED, Json(contact)))
}
