/// Persistence layer
///
/// The scheduler and the workflow service only talk to storage through the
/// [`Store`] trait. Two backends are provided:
/// - `SqliteStore`: sqlx-backed, file database created on demand
/// - `MemoryStore`: process-local maps, used for tests and embedding

use crate::error::Result;
use crate::workflow::types::{
    ArchiveEntry, ArchiveStatus, Contact, EmailEvent, QueueEntry, WorkflowDefinition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// Pool creation and schema initialisation
pub mod database;

// sqlx/SQLite implementation
pub mod sqlite;

// In-memory implementation
pub mod memory;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A stored row that could not be decoded; it stays in place and is skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRow {
    pub table: &'static str,
    /// Raw primary key as stored, or `<unreadable>`
    pub row_id: String,
    pub error: String,
}

/// Result of a multi-row read: decoded rows in order, plus rows that failed to decode
#[derive(Debug, Clone)]
pub struct Scan<T> {
    pub rows: Vec<T>,
    pub malformed: Vec<MalformedRow>,
}

impl<T> Default for Scan<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            malformed: Vec::new(),
        }
    }
}

impl<T> From<Vec<T>> for Scan<T> {
    fn from(rows: Vec<T>) -> Self {
        Self {
            rows,
            malformed: Vec::new(),
        }
    }
}

/// Storage operations consumed by the workflow service and the scheduler
///
/// Implementations must never reset `EmailEvent::sent` from true to false and
/// must return queue entries in FIFO order.
#[async_trait]
pub trait Store: Send + Sync {
    // Contacts
    async fn insert_contact(&self, contact: &Contact) -> Result<()>;
    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>>;

    // Workflow definitions
    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()>;
    async fn get_workflow(&self, id: Uuid) -> Result<Option<WorkflowDefinition>>;
    async fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>>;
    /// Returns false when nothing was deleted
    async fn delete_workflow(&self, id: Uuid) -> Result<bool>;

    // Email events
    async fn insert_email_event(&self, event: &EmailEvent) -> Result<()>;
    async fn get_email_event(&self, id: Uuid) -> Result<Option<EmailEvent>>;
    /// Fails with `NotFound` when the row no longer exists
    async fn update_email_event(&self, event: &EmailEvent) -> Result<()>;
    /// Unsent events with `send_at <= before`, earliest first, excluding
    /// events whose queue entry was dead-lettered
    ///
    /// A row that fails to decode is reported in `Scan::malformed` instead of
    /// failing the whole read.
    async fn find_due(&self, before: DateTime<Utc>) -> Result<Scan<EmailEvent>>;
    async fn find_email_events_by_recipient(&self, email: &str) -> Result<Vec<EmailEvent>>;
    /// Returns the number of removed rows
    async fn delete_email_events_by_recipient(&self, email: &str) -> Result<u64>;

    // Queue
    async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()>;
    async fn find_queue_entry_by_event_id(&self, event_id: Uuid) -> Result<Option<QueueEntry>>;
    /// Whether any queue row references `event_id`, without decoding it
    async fn is_event_queued(&self, event_id: Uuid) -> Result<bool>;
    /// FIFO; undecodable rows land in `Scan::malformed`
    async fn list_queue_entries(&self) -> Result<Scan<QueueEntry>>;
    async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<()>;
    async fn delete_queue_entry(&self, id: Uuid) -> Result<()>;

    // Archive
    async fn insert_archive_entry(
        &self,
        entry: &QueueEntry,
        status: ArchiveStatus,
    ) -> Result<ArchiveEntry>;
    async fn list_archive_entries(&self) -> Result<Vec<ArchiveEntry>>;
}
