/// Core record definitions
///
/// Workflow definitions are templates; email events, queue entries and
/// archive entries are the rows the scheduler works on. Queue and archive
/// entries embed a full copy of their email event rather than a reference,
/// so later edits to the source row never change what was queued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One step of a workflow: an email sent `send_delay_secs` after enrollment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailEventTemplate {
    /// Delay relative to the moment the contact is enrolled
    pub send_delay_secs: u64,
    pub subject: String,
    pub body: String,
    /// Sender address recorded on every materialized event
    pub send_from: String,
}

impl EmailEventTemplate {
    pub fn new(
        send_delay: std::time::Duration,
        subject: impl Into<String>,
        body: impl Into<String>,
        send_from: impl Into<String>,
    ) -> Self {
        Self {
            send_delay_secs: send_delay.as_secs(),
            subject: subject.into(),
            body: body.into(),
            send_from: send_from.into(),
        }
    }

    pub fn send_delay(&self) -> chrono::Duration {
        i64::try_from(self.send_delay_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// A named, ordered sequence of email templates
///
/// Only obtainable through [`WorkflowBuilder`](crate::workflow::WorkflowBuilder)
/// or from storage, and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    id: Uuid,
    name: String,
    description: String,
    email_events: Vec<EmailEventTemplate>,
}

impl WorkflowDefinition {
    pub(crate) fn new(
        name: String,
        description: String,
        email_events: Vec<EmailEventTemplate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            email_events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn email_events(&self) -> &[EmailEventTemplate] {
        &self.email_events
    }
}

/// A recipient that workflows can be started for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            created_at: Utc::now(),
        }
    }
}

/// One concrete email scheduled for one recipient
///
/// `send_to` is a snapshot of the contact's address at enrollment time and
/// `send_at` is absolute. `sent` only ever moves from false to true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailEvent {
    pub id: Uuid,
    pub contact_id: Option<Uuid>,
    pub send_from: String,
    pub send_to: String,
    pub send_at: DateTime<Utc>,
    pub subject: String,
    pub body: String,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

impl EmailEvent {
    /// Materialize a template for a contact, due at `now + send_delay`
    pub fn materialize(
        template: &EmailEventTemplate,
        contact: &Contact,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id: Some(contact.id),
            send_from: template.send_from.clone(),
            send_to: contact.email.clone(),
            send_at: now
                .checked_add_signed(template.send_delay())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            subject: template.subject.clone(),
            body: template.body.clone(),
            sent: false,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.sent && self.send_at <= now
    }

    /// Flag the event as delivered; returns false when it already was
    pub fn mark_sent(&mut self) -> bool {
        if self.sent {
            return false;
        }
        self.sent = true;
        true
    }
}

/// A due email event staged for sending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub payload: EmailEvent,
    /// Failed send attempts so far
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(payload: EmailEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempts: 0,
            last_error: None,
            enqueued_at: now,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.payload.id
    }

    /// Record a failed attempt and report whether `max_tries` is exhausted
    pub fn record_failure(&mut self, error: &str, max_tries: Option<u32>) -> bool {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.to_string());
        max_tries.is_some_and(|max| self.attempts >= max)
    }
}

/// Why a queue entry left the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    /// Delivered (or found already delivered) and removed
    Sent,
    /// Gave up after exhausting its send attempts
    DeadLetter,
}

impl ArchiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveStatus::Sent => "sent",
            ArchiveStatus::DeadLetter => "dead_letter",
        }
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(ArchiveStatus::Sent),
            "dead_letter" => Ok(ArchiveStatus::DeadLetter),
            other => Err(format!("unknown archive status '{}'", other)),
        }
    }
}

/// Append-only record of a processed queue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Independent, increasing sequence
    pub id: i64,
    pub status: ArchiveStatus,
    pub queue_data: QueueEntry,
    pub archived_at: DateTime<Utc>,
}
