/// Error taxonomy shared by the store, the email senders, the workflow
/// service and the scheduler.

use thiserror::Error;

/// Errors surfaced by workflow orchestration and its collaborators
///
/// - `NotFound`: a contact, workflow or target row does not exist
/// - `Validation`: incomplete builder state or a rejected payload
/// - `Store`: a persistence operation failed
/// - `Send`: email dispatch failed or timed out
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("send error: {0}")]
    Send(String),
}

/// Result alias used across the crate's public APIs
pub type Result<T> = std::result::Result<T, WorkflowError>;

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        WorkflowError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Store(format!("payload encoding: {}", err))
    }
}
