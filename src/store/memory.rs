/// In-memory store
///
/// Keeps every table in insertion-ordered vectors behind a single mutex, which
/// gives the same FIFO and uniqueness behaviour as the SQLite backend.

use crate::error::{Result, WorkflowError};
use crate::store::{Scan, Store};
use crate::workflow::types::{
    ArchiveEntry, ArchiveStatus, Contact, EmailEvent, QueueEntry, WorkflowDefinition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    contacts: Vec<Contact>,
    workflows: Vec<WorkflowDefinition>,
    email_events: Vec<EmailEvent>,
    queue: Vec<QueueEntry>,
    archive: Vec<ArchiveEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| WorkflowError::Store("memory store lock poisoned".to_string()))?;
        f(&mut tables)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_contact(&self, contact: &Contact) -> Result<()> {
        self.with(|t| {
            if t.contacts.iter().any(|c| c.email == contact.email) {
                return Err(WorkflowError::Validation(format!(
                    "contact with email '{}' already exists",
                    contact.email
                )));
            }
            t.contacts.push(contact.clone());
            Ok(())
        })
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>> {
        self.with(|t| Ok(t.contacts.iter().find(|c| c.email == email).cloned()))
    }

    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        self.with(|t| {
            if t.workflows
                .iter()
                .any(|w| w.name() == workflow.name() && w.id() != workflow.id())
            {
                return Err(WorkflowError::Validation(format!(
                    "workflow name '{}' is already in use",
                    workflow.name()
                )));
            }
            match t.workflows.iter_mut().find(|w| w.id() == workflow.id()) {
                Some(existing) => *existing = workflow.clone(),
                None => t.workflows.push(workflow.clone()),
            }
            Ok(())
        })
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<WorkflowDefinition>> {
        self.with(|t| Ok(t.workflows.iter().find(|w| w.id() == id).cloned()))
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        self.with(|t| Ok(t.workflows.clone()))
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool> {
        self.with(|t| {
            let before = t.workflows.len();
            t.workflows.retain(|w| w.id() != id);
            Ok(t.workflows.len() < before)
        })
    }

    async fn insert_email_event(&self, event: &EmailEvent) -> Result<()> {
        self.with(|t| {
            t.email_events.push(event.clone());
            Ok(())
        })
    }

    async fn get_email_event(&self, id: Uuid) -> Result<Option<EmailEvent>> {
        self.with(|t| Ok(t.email_events.iter().find(|e| e.id == id).cloned()))
    }

    async fn update_email_event(&self, event: &EmailEvent) -> Result<()> {
        self.with(|t| {
            let existing = t
                .email_events
                .iter_mut()
                .find(|e| e.id == event.id)
                .ok_or_else(|| WorkflowError::NotFound(format!("email event {}", event.id)))?;
            let already_sent = existing.sent;
            *existing = event.clone();
            existing.sent |= already_sent;
            Ok(())
        })
    }

    async fn find_due(&self, before: DateTime<Utc>) -> Result<Scan<EmailEvent>> {
        self.with(|t| {
            let mut due: Vec<EmailEvent> = t
                .email_events
                .iter()
                .filter(|e| e.is_due(before))
                .filter(|e| {
                    !t.archive.iter().any(|a| {
                        a.status == ArchiveStatus::DeadLetter && a.queue_data.event_id() == e.id
                    })
                })
                .cloned()
                .collect();
            // stable sort keeps insertion order for equal timestamps
            due.sort_by_key(|e| e.send_at);
            Ok(due.into())
        })
    }

    async fn find_email_events_by_recipient(&self, email: &str) -> Result<Vec<EmailEvent>> {
        self.with(|t| Ok(t.email_events.iter().filter(|e| e.send_to == email).cloned().collect()))
    }

    async fn delete_email_events_by_recipient(&self, email: &str) -> Result<u64> {
        self.with(|t| {
            let before = t.email_events.len();
            t.email_events.retain(|e| e.send_to != email);
            Ok((before - t.email_events.len()) as u64)
        })
    }

    async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        self.with(|t| {
            if t.queue.iter().any(|q| q.event_id() == entry.event_id()) {
                return Err(WorkflowError::Store(format!(
                    "email event {} is already queued",
                    entry.event_id()
                )));
            }
            t.queue.push(entry.clone());
            Ok(())
        })
    }

    async fn find_queue_entry_by_event_id(&self, event_id: Uuid) -> Result<Option<QueueEntry>> {
        self.with(|t| Ok(t.queue.iter().find(|q| q.event_id() == event_id).cloned()))
    }

    async fn is_event_queued(&self, event_id: Uuid) -> Result<bool> {
        self.with(|t| Ok(t.queue.iter().any(|q| q.event_id() == event_id)))
    }

    async fn list_queue_entries(&self) -> Result<Scan<QueueEntry>> {
        self.with(|t| Ok(t.queue.clone().into()))
    }

    async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        self.with(|t| {
            let existing = t
                .queue
                .iter_mut()
                .find(|q| q.id == entry.id)
                .ok_or_else(|| WorkflowError::NotFound(format!("queue entry {}", entry.id)))?;
            *existing = entry.clone();
            Ok(())
        })
    }

    async fn delete_queue_entry(&self, id: Uuid) -> Result<()> {
        self.with(|t| {
            t.queue.retain(|q| q.id != id);
            Ok(())
        })
    }

    async fn insert_archive_entry(
        &self,
        entry: &QueueEntry,
        status: ArchiveStatus,
    ) -> Result<ArchiveEntry> {
        self.with(|t| {
            let id = t.archive.last().map(|a| a.id + 1).unwrap_or(1);
            let archived = ArchiveEntry {
                id,
                status,
                queue_data: entry.clone(),
                archived_at: Utc::now(),
            };
            t.archive.push(archived.clone());
            Ok(archived)
        })
    }

    async fn list_archive_entries(&self) -> Result<Vec<ArchiveEntry>> {
        self.with(|t| Ok(t.archive.clone()))
    }
}
