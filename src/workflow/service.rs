/// Workflow orchestration
///
/// Starts workflows for contacts by materializing email events, cancels
/// pending mail on unsubscribe, and stores workflow definitions. The
/// scheduler picks the materialized events up on its next tick.

use crate::error::{Result, WorkflowError};
use crate::store::Store;
use crate::workflow::builder::WorkflowBuilder;
use crate::workflow::types::{Contact, EmailEvent, WorkflowDefinition};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct WorkflowService {
    store: Arc<dyn Store>,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fresh builder for a new definition; persist it with [`save`](Self::save)
    pub fn create(&self) -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    /// Register a contact so workflows can be started for it
    pub async fn register_contact(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<Contact> {
        let email = email.trim();
        if email.is_empty() {
            return Err(WorkflowError::Validation("contact email is required".to_string()));
        }
        let contact = Contact::new(first_name, last_name, email);
        self.store.insert_contact(&contact).await?;
        tracing::info!("👤 Registered contact {} ({})", contact.email, contact.id);
        Ok(contact)
    }

    pub async fn find_contact(&self, email: &str) -> Result<Contact> {
        self.store
            .find_contact_by_email(email)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("contact '{}'", email)))
    }

    /// Start `workflow` for the contact owning `contact_email`
    pub async fn start(
        &self,
        workflow: &WorkflowDefinition,
        contact_email: &str,
    ) -> Result<Vec<EmailEvent>> {
        self.start_at(workflow, contact_email, Utc::now()).await
    }

    /// Like [`start`](Self::start) with an explicit enrollment time
    ///
    /// Every template becomes one email event due at `now + send_delay`. Rows
    /// are written one by one; a failure stops the loop and leaves the events
    /// already written in place.
    pub async fn start_at(
        &self,
        workflow: &WorkflowDefinition,
        contact_email: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<EmailEvent>> {
        let contact = self.find_contact(contact_email).await?;

        let mut events = Vec::with_capacity(workflow.email_events().len());
        for (index, template) in workflow.email_events().iter().enumerate() {
            let event = EmailEvent::materialize(template, &contact, now);
            self.store.insert_email_event(&event).await?;
            tracing::info!(
                "📅 Email event {} from workflow '{}' scheduled for {} at {} (id {})",
                index,
                workflow.name(),
                event.send_to,
                event.send_at.to_rfc3339(),
                event.id
            );
            events.push(event);
        }

        Ok(events)
    }

    /// Start a stored workflow by id
    pub async fn start_by_id(
        &self,
        workflow_id: Uuid,
        contact_email: &str,
    ) -> Result<Vec<EmailEvent>> {
        let workflow = self.retrieve(workflow_id).await?;
        self.start(&workflow, contact_email).await
    }

    /// Remove every email event addressed to `contact_email`, sent or not
    ///
    /// Returns the number of removed events; zero is not an error.
    pub async fn unsubscribe(&self, contact_email: &str) -> Result<u64> {
        let existing = self.store.find_email_events_by_recipient(contact_email).await?;
        if existing.is_empty() {
            tracing::debug!("📭 Nothing to unsubscribe for {}", contact_email);
            return Ok(0);
        }

        let removed = self.store.delete_email_events_by_recipient(contact_email).await?;
        tracing::info!("🚫 Unsubscribed {}: removed {} email events", contact_email, removed);
        Ok(removed)
    }

    /// Persist a definition; the name must be unique
    pub async fn save(&self, workflow: &WorkflowDefinition) -> Result<WorkflowDefinition> {
        if workflow.name().trim().is_empty() || workflow.email_events().is_empty() {
            return Err(WorkflowError::Validation(
                "incomplete workflow configuration".to_string(),
            ));
        }
        self.store.save_workflow(workflow).await?;
        tracing::info!("💾 Saved workflow '{}' ({})", workflow.name(), workflow.id());
        Ok(workflow.clone())
    }

    pub async fn retrieve(&self, workflow_id: Uuid) -> Result<WorkflowDefinition> {
        self.store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("workflow {}", workflow_id)))
    }

    pub async fn delete(&self, workflow_id: Uuid) -> Result<()> {
        if !self.store.delete_workflow(workflow_id).await? {
            return Err(WorkflowError::NotFound(format!("workflow {}", workflow_id)));
        }
        tracing::info!("🗑️ Deleted workflow {}", workflow_id);
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<WorkflowDefinition>> {
        self.store.list_workflows().await
    }
}
