/// SQLite database bootstrap
///
/// Opens the connection pool for the configured database file and creates
/// the contact, workflow, email event, queue and archive tables.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;

/// Open (creating if missing) the database file and initialise its schema
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let path = Path::new(db_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!("Failed to create database directory '{}': {}", parent.display(), e)
        })?;
    }

    tracing::info!("🗄️ Opening database pool: {}", path.display());

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    init_schema(&pool).await?;

    tracing::info!("✅ Database ready: {}", path.display());

    Ok(pool)
}

/// Create tables and indexes; safe to call repeatedly
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            definition JSON NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // send_at and created_at are unix milliseconds so due scans compare integers
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS email_events (
            id TEXT PRIMARY KEY,
            contact_id TEXT,
            send_from TEXT NOT NULL,
            send_to TEXT NOT NULL,
            send_at INTEGER NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            sent INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_queue (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            payload JSON NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            enqueued_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_queue_archive (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            queue_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            status TEXT NOT NULL,
            queue_data JSON NOT NULL,
            archived_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_email_events_due ON email_events(sent, send_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_email_events_send_to ON email_events(send_to)")
        .execute(pool)
        .await?;

    // At most one queue entry per email event
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_event_id ON workflow_queue(event_id)")
        .execute(pool)
        .await?;

    // Due scans exclude dead-lettered events on every tick
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_archive_status_event
        ON workflow_queue_archive(status, event_id)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
