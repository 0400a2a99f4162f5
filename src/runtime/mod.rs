/// Runtime
///
/// Background delivery of materialized workflow emails:
/// - Tick-driven select → enqueue → drain pipeline
/// - Start/stop lifecycle owned by the caller through `SchedulerHandle`

// Workflow email scheduler
pub mod scheduler;

// Re-export main types
pub use scheduler::{DrainFailure, Scheduler, SchedulerHandle, TickReport};
