/// Workflow Management Layer
///
/// This module handles workflow definitions and their orchestration:
/// - Type definitions (definitions, email events, queue and archive entries)
/// - Fluent builder with validation
/// - Service that starts workflows, unsubscribes contacts and stores definitions

// Core workflow type definitions
pub mod types;

// Validating builder for workflow definitions
pub mod builder;

// Orchestration surface over the store
pub mod service;

// Re-export commonly used types
pub use builder::WorkflowBuilder;
pub use service::WorkflowService;
pub use types::{
    ArchiveEntry, ArchiveStatus, Contact, EmailEvent, EmailEventTemplate, QueueEntry,
    WorkflowDefinition,
};
