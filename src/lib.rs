/// Upflo: workflow-driven email scheduling
///
/// Users define workflows (ordered email templates with send delays), start
/// them for contacts, and a periodic scheduler moves due emails through a
/// persistent queue to the configured email provider, archiving what it sends.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by every layer
pub mod error;

// Workflow management layer - definitions, builder and orchestration service
pub mod workflow;

// Persistence layer - SQLite and in-memory stores
pub mod store;

// Outbound email providers
pub mod email;

// Runtime - the tick-driven email scheduler
pub mod runtime;

// HTTP API layer - REST endpoints for workflows and contacts
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{Result, WorkflowError};
pub use runtime::{Scheduler, SchedulerHandle, TickReport};
pub use server::start_server;
pub use workflow::{
    Contact, EmailEvent, EmailEventTemplate, WorkflowBuilder, WorkflowDefinition, WorkflowService,
};
