/// SQLite persistence for workflows, email events, the queue and its archive
///
/// Workflow definitions and queue payloads are stored as JSON; timestamps
/// used in comparisons are unix milliseconds.

use crate::error::{Result, WorkflowError};
use crate::store::{database, MalformedRow, Scan, Store};
use crate::workflow::types::{
    ArchiveEntry, ArchiveStatus, Contact, EmailEvent, QueueEntry, WorkflowDefinition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

/// SQLite-based store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an already initialised pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database file at `path`, creating file and schema if needed
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let pool = database::connect(path).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| WorkflowError::Store(format!("malformed id '{}': {}", raw, e)))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| WorkflowError::Store(format!("timestamp out of range: {}", ms)))
}

fn contact_from_row(row: &SqliteRow) -> Result<Contact> {
    Ok(Contact {
        id: parse_uuid(row.try_get("id")?)?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

fn email_event_from_row(row: &SqliteRow) -> Result<EmailEvent> {
    let contact_id: Option<String> = row.try_get("contact_id")?;
    Ok(EmailEvent {
        id: parse_uuid(row.try_get("id")?)?,
        contact_id: contact_id.as_deref().map(parse_uuid).transpose()?,
        send_from: row.try_get("send_from")?,
        send_to: row.try_get("send_to")?,
        send_at: from_millis(row.try_get("send_at")?)?,
        subject: row.try_get("subject")?,
        body: row.try_get("body")?,
        sent: row.try_get("sent")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

fn queue_entry_from_row(row: &SqliteRow) -> Result<QueueEntry> {
    let payload: String = row.try_get("payload")?;
    let attempts: i64 = row.try_get("attempts")?;
    Ok(QueueEntry {
        id: parse_uuid(row.try_get("id")?)?,
        payload: serde_json::from_str(&payload)?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        last_error: row.try_get("last_error")?,
        enqueued_at: from_millis(row.try_get("enqueued_at")?)?,
    })
}

fn archive_entry_from_row(row: &SqliteRow) -> Result<ArchiveEntry> {
    let status: String = row.try_get("status")?;
    let queue_data: String = row.try_get("queue_data")?;
    Ok(ArchiveEntry {
        id: row.try_get("id")?,
        status: status.parse().map_err(WorkflowError::Store)?,
        queue_data: serde_json::from_str(&queue_data)?,
        archived_at: from_millis(row.try_get("archived_at")?)?,
    })
}

/// Decode rows one by one; a row that fails is logged and reported, not fatal
fn scan_rows<T>(
    table: &'static str,
    rows: &[SqliteRow],
    decode: fn(&SqliteRow) -> Result<T>,
) -> Scan<T> {
    let mut scan = Scan::default();
    for row in rows {
        match decode(row) {
            Ok(item) => scan.rows.push(item),
            Err(e) => {
                let row_id = row
                    .try_get::<String, _>("id")
                    .unwrap_or_else(|_| "<unreadable>".to_string());
                tracing::warn!("⚠️ Skipping malformed {} row {}: {}", table, row_id, e);
                scan.malformed.push(MalformedRow {
                    table,
                    row_id,
                    error: e.to_string(),
                });
            }
        }
    }
    scan
}

/// Turn unique-constraint violations into validation errors
fn unique_as_validation(err: sqlx::Error, message: String) -> WorkflowError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => WorkflowError::Validation(message),
        _ => err.into(),
    }
}

const EMAIL_EVENT_COLUMNS: &str =
    "id, contact_id, send_from, send_to, send_at, subject, body, sent, created_at";

#[async_trait]
impl Store for SqliteStore {
    async fn insert_contact(&self, contact: &Contact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contacts (id, first_name, last_name, email, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(contact.id.to_string())
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.email)
        .bind(contact.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let message = format!("contact with email '{}' already exists", contact.email);
            unique_as_validation(e, message)
        })?;

        Ok(())
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, email, created_at FROM contacts WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(contact_from_row).transpose()
    }

    /// Uses UPSERT so saving an existing definition replaces it
    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, description, definition, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(workflow.id().to_string())
        .bind(workflow.name())
        .bind(workflow.description())
        .bind(&definition_json)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let message = format!("workflow name '{}' is already in use", workflow.name());
            unique_as_validation(e, message)
        })?;

        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<WorkflowDefinition>> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.try_get("definition")?;
                Ok(Some(serde_json::from_str(&definition_json)?))
            }
            None => Ok(None),
        }
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        let rows =
            sqlx::query("SELECT definition FROM workflows ORDER BY created_at ASC, rowid ASC")
                .fetch_all(&self.pool)
                .await?;

        let mut workflows = Vec::with_capacity(rows.len());
        for row in rows {
            let definition_json: String = row.try_get("definition")?;
            workflows.push(serde_json::from_str(&definition_json)?);
        }

        Ok(workflows)
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_email_event(&self, event: &EmailEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO email_events
                (id, contact_id, send_from, send_to, send_at, subject, body, sent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.contact_id.map(|id| id.to_string()))
        .bind(&event.send_from)
        .bind(&event.send_to)
        .bind(event.send_at.timestamp_millis())
        .bind(&event.subject)
        .bind(&event.body)
        .bind(event.sent)
        .bind(event.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_email_event(&self, id: Uuid) -> Result<Option<EmailEvent>> {
        let sql = format!("SELECT {} FROM email_events WHERE id = ?", EMAIL_EVENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(email_event_from_row).transpose()
    }

    /// `sent` is merged with MAX so a stale copy can never clear the flag
    async fn update_email_event(&self, event: &EmailEvent) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE email_events SET
                send_from = ?,
                send_to = ?,
                send_at = ?,
                subject = ?,
                body = ?,
                sent = MAX(sent, ?)
            WHERE id = ?
            "#,
        )
        .bind(&event.send_from)
        .bind(&event.send_to)
        .bind(event.send_at.timestamp_millis())
        .bind(&event.subject)
        .bind(&event.body)
        .bind(event.sent)
        .bind(event.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(format!("email event {}", event.id)));
        }
        Ok(())
    }

    async fn find_due(&self, before: DateTime<Utc>) -> Result<Scan<EmailEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM email_events
            WHERE sent = 0 AND send_at <= ?
              AND id NOT IN (SELECT event_id FROM workflow_queue_archive WHERE status = ?)
            ORDER BY send_at ASC, rowid ASC
            "#,
            EMAIL_EVENT_COLUMNS
        ))
        .bind(before.timestamp_millis())
        .bind(ArchiveStatus::DeadLetter.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(scan_rows("email_events", &rows, email_event_from_row))
    }

    async fn find_email_events_by_recipient(&self, email: &str) -> Result<Vec<EmailEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM email_events WHERE send_to = ? ORDER BY send_at ASC, rowid ASC",
            EMAIL_EVENT_COLUMNS
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(email_event_from_row).collect()
    }

    async fn delete_email_events_by_recipient(&self, email: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM email_events WHERE send_to = ?")
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        let payload_json = serde_json::to_string(&entry.payload)?;

        sqlx::query(
            r#"
            INSERT INTO workflow_queue (id, event_id, payload, attempts, last_error, enqueued_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.event_id().to_string())
        .bind(&payload_json)
        .bind(i64::from(entry.attempts))
        .bind(entry.last_error.as_deref())
        .bind(entry.enqueued_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_queue_entry_by_event_id(&self, event_id: Uuid) -> Result<Option<QueueEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, payload, attempts, last_error, enqueued_at FROM workflow_queue
            WHERE event_id = ?
            "#,
        )
        .bind(event_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(queue_entry_from_row).transpose()
    }

    async fn is_event_queued(&self, event_id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM workflow_queue WHERE event_id = ? LIMIT 1")
            .bind(event_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn list_queue_entries(&self) -> Result<Scan<QueueEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, attempts, last_error, enqueued_at FROM workflow_queue
            ORDER BY enqueued_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(scan_rows("workflow_queue", &rows, queue_entry_from_row))
    }

    async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        let result =
            sqlx::query("UPDATE workflow_queue SET attempts = ?, last_error = ? WHERE id = ?")
                .bind(i64::from(entry.attempts))
                .bind(entry.last_error.as_deref())
                .bind(entry.id.to_string())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::NotFound(format!("queue entry {}", entry.id)));
        }
        Ok(())
    }

    async fn delete_queue_entry(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM workflow_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_archive_entry(
        &self,
        entry: &QueueEntry,
        status: ArchiveStatus,
    ) -> Result<ArchiveEntry> {
        let queue_data = serde_json::to_string(entry)?;
        let archived_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO workflow_queue_archive (queue_id, event_id, status, queue_data, archived_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.event_id().to_string())
        .bind(status.as_str())
        .bind(&queue_data)
        .bind(archived_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(ArchiveEntry {
            id: result.last_insert_rowid(),
            status,
            queue_data: entry.clone(),
            archived_at: from_millis(archived_at.timestamp_millis())?,
        })
    }

    async fn list_archive_entries(&self) -> Result<Vec<ArchiveEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, queue_data, archived_at FROM workflow_queue_archive
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(archive_entry_from_row).collect()
    }
}
