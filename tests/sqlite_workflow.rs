//! End-to-end workflow runs against a file-backed SQLite store

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use upflo::config::SchedulerConfig;
use upflo::email::EmailSender;
use upflo::store::{SqliteStore, Store};
use upflo::workflow::types::ArchiveStatus;
use upflo::{EmailEventTemplate, Scheduler, WorkflowDefinition, WorkflowError, WorkflowService};

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingSender {
    fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, s, _)| s.clone()).collect()
    }

    fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(to, _, _)| to.clone()).collect()
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> upflo::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

struct RejectingSender;

#[async_trait]
impl EmailSender for RejectingSender {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> upflo::Result<()> {
        Err(WorkflowError::Send(format!("mailbox {} rejected", to)))
    }
}

fn temp_db_path() -> String {
    std::env::temp_dir()
        .join(format!("upflo-test-{}", uuid::Uuid::new_v4()))
        .join("upflo.db")
        .to_string_lossy()
        .into_owned()
}

struct Harness {
    store: Arc<SqliteStore>,
    service: WorkflowService,
    sender: Arc<RecordingSender>,
    scheduler: Scheduler,
}

async fn harness() -> Harness {
    let store = Arc::new(SqliteStore::open(&temp_db_path()).await.unwrap());
    let sender = Arc::new(RecordingSender::default());
    let config = SchedulerConfig {
        tick_interval_secs: 1,
        send_timeout_secs: 5,
        max_tries: 5,
    };
    Harness {
        service: WorkflowService::new(store.clone()),
        scheduler: Scheduler::new(store.clone(), sender.clone(), config),
        store,
        sender,
    }
}

fn one_step_workflow(service: &WorkflowService) -> WorkflowDefinition {
    service
        .create()
        .set_name("welcome")
        .add_email_event(EmailEventTemplate::new(
            Duration::ZERO,
            "Welcome",
            "Hello",
            "sender@example.com",
        ))
        .build()
        .unwrap()
}

fn two_step_workflow(service: &WorkflowService) -> WorkflowDefinition {
    service
        .create()
        .set_name("test")
        .set_description("test")
        .add_email_event(EmailEventTemplate::new(
            Duration::ZERO,
            "Email 1 subject",
            "Email 1 body",
            "sender@example.com",
        ))
        .add_email_event(EmailEventTemplate::new(
            Duration::from_secs(3600),
            "Email 2 subject",
            "Email 2 body",
            "sender@example.com",
        ))
        .build()
        .unwrap()
}

#[tokio::test]
async fn two_step_workflow_delivers_each_email_once() {
    let h = harness().await;
    h.service.register_contact("Test", "User", "test@email.com").await.unwrap();
    let workflow = two_step_workflow(&h.service);
    let t0 = Utc::now();

    let events = h.service.start_at(&workflow, "test@email.com", t0).await.unwrap();
    assert_eq!(events.len(), 2);

    let first = h.scheduler.tick_at(t0 + ChronoDuration::seconds(5)).await;
    assert_eq!(first.selected, 1);
    assert_eq!(first.archived, 1);
    assert_eq!(h.sender.subjects(), vec!["Email 1 subject"]);
    assert!(h.store.get_email_event(events[0].id).await.unwrap().unwrap().sent);
    assert!(!h.store.get_email_event(events[1].id).await.unwrap().unwrap().sent);

    let second = h.scheduler.tick_at(t0 + ChronoDuration::seconds(2)).await;
    assert_eq!(second.selected, 0);
    assert_eq!(second.enqueued, 0);
    assert_eq!(h.sender.subjects().len(), 1);

    let third = h.scheduler.tick_at(t0 + ChronoDuration::seconds(3605)).await;
    assert_eq!(third.archived, 1);
    assert_eq!(h.sender.subjects(), vec!["Email 1 subject", "Email 2 subject"]);

    assert!(h.store.list_queue_entries().await.unwrap().rows.is_empty());
    let archive = h.store.list_archive_entries().await.unwrap();
    assert_eq!(archive.len(), 2);
    assert!(archive.iter().all(|a| a.status == ArchiveStatus::Sent));
    assert!(archive[1].id > archive[0].id);
    assert_eq!(archive[0].queue_data.payload.subject, "Email 1 subject");
}

#[tokio::test]
async fn unsubscribe_before_due_prevents_delivery() {
    let h = harness().await;
    h.service.register_contact("Test", "User", "test@email.com").await.unwrap();
    let workflow = two_step_workflow(&h.service);
    let t0 = Utc::now();
    h.service.start_at(&workflow, "test@email.com", t0).await.unwrap();

    h.scheduler.tick_at(t0 + ChronoDuration::seconds(2)).await;
    assert_eq!(h.service.unsubscribe("test@email.com").await.unwrap(), 2);

    let later = h.scheduler.tick_at(t0 + ChronoDuration::seconds(3605)).await;
    assert_eq!(later.selected, 0);
    assert_eq!(h.sender.subjects(), vec!["Email 1 subject"]);
}

#[tokio::test]
async fn workflow_definitions_survive_reopen() {
    let path = temp_db_path();
    let saved = {
        let store = Arc::new(SqliteStore::open(&path).await.unwrap());
        let service = WorkflowService::new(store);
        service.save(&two_step_workflow(&service)).await.unwrap()
    };

    let service = WorkflowService::new(Arc::new(SqliteStore::open(&path).await.unwrap()));
    let loaded = service.retrieve(saved.id()).await.unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.email_events()[1].send_delay_secs, 3600);

    let err = service.save(&two_step_workflow(&service)).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn queue_rejects_second_entry_for_same_event() {
    let h = harness().await;
    h.service.register_contact("Test", "User", "test@email.com").await.unwrap();
    let t0 = Utc::now();
    let events = h
        .service
        .start_at(&two_step_workflow(&h.service), "test@email.com", t0)
        .await
        .unwrap();

    let entry = upflo::workflow::QueueEntry::new(events[0].clone(), t0);
    h.store.insert_queue_entry(&entry).await.unwrap();
    let duplicate = upflo::workflow::QueueEntry::new(events[0].clone(), t0);
    assert!(h.store.insert_queue_entry(&duplicate).await.is_err());
    assert_eq!(h.store.list_queue_entries().await.unwrap().rows.len(), 1);
}

#[tokio::test]
async fn malformed_queue_row_does_not_stall_delivery() {
    let h = harness().await;
    let bad_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO workflow_queue (id, event_id, payload, attempts, last_error, enqueued_at)
        VALUES (?, ?, 'not json', 0, NULL, 0)
        "#,
    )
    .bind(&bad_id)
    .bind(uuid::Uuid::new_v4().to_string())
    .execute(h.store.pool())
    .await
    .unwrap();

    h.service.register_contact("Good", "User", "good@x.com").await.unwrap();
    let t0 = Utc::now();
    h.service.start_at(&one_step_workflow(&h.service), "good@x.com", t0).await.unwrap();

    let report = h.scheduler.tick_at(t0 + ChronoDuration::seconds(1)).await;

    assert_eq!(report.enqueued, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.archived, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].table, "workflow_queue");
    assert_eq!(report.skipped[0].row_id, bad_id);
    assert_eq!(h.sender.recipients(), vec!["good@x.com"]);

    // the bad row is left in place and reported again, never dropped silently
    let again = h.scheduler.tick_at(t0 + ChronoDuration::seconds(2)).await;
    assert_eq!(again.skipped.len(), 1);
    let scan = h.store.list_queue_entries().await.unwrap();
    assert!(scan.rows.is_empty());
    assert_eq!(scan.malformed.len(), 1);
}

#[tokio::test]
async fn malformed_email_event_row_does_not_hide_due_events() {
    let h = harness().await;
    sqlx::query(
        r#"
        INSERT INTO email_events
            (id, contact_id, send_from, send_to, send_at, subject, body, sent, created_at)
        VALUES ('not-a-uuid', NULL, 'sender@example.com', 'ghost@x.com', 0, 's', 'b', 0, 0)
        "#,
    )
    .execute(h.store.pool())
    .await
    .unwrap();

    h.service.register_contact("Good", "User", "good@x.com").await.unwrap();
    let t0 = Utc::now();
    h.service.start_at(&one_step_workflow(&h.service), "good@x.com", t0).await.unwrap();

    let report = h.scheduler.tick_at(t0 + ChronoDuration::seconds(1)).await;

    assert_eq!(report.selected, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].table, "email_events");
    assert_eq!(report.skipped[0].row_id, "not-a-uuid");
    assert_eq!(h.sender.recipients(), vec!["good@x.com"]);
}

#[tokio::test]
async fn stale_update_never_clears_sent_flag() {
    let h = harness().await;
    h.service.register_contact("Test", "User", "test@email.com").await.unwrap();
    let t0 = Utc::now();
    let events = h
        .service
        .start_at(&two_step_workflow(&h.service), "test@email.com", t0)
        .await
        .unwrap();

    let stale = events[0].clone();
    let mut delivered = events[0].clone();
    assert!(delivered.mark_sent());
    h.store.update_email_event(&delivered).await.unwrap();
    h.store.update_email_event(&stale).await.unwrap();

    assert!(h.store.get_email_event(stale.id).await.unwrap().unwrap().sent);
    let due = h.store.find_due(t0 + ChronoDuration::seconds(5)).await.unwrap();
    assert!(due.rows.is_empty());
}

#[tokio::test]
async fn dead_lettered_event_is_never_selected_again() {
    let h = harness().await;
    h.service.register_contact("Bad", "User", "bad@x.com").await.unwrap();
    let t0 = Utc::now();
    let events = h
        .service
        .start_at(&one_step_workflow(&h.service), "bad@x.com", t0)
        .await
        .unwrap();
    let config = SchedulerConfig {
        tick_interval_secs: 1,
        send_timeout_secs: 5,
        max_tries: 1,
    };
    let scheduler = Scheduler::new(h.store.clone(), Arc::new(RejectingSender), config);
    let later = t0 + ChronoDuration::seconds(5);

    let first = scheduler.tick_at(later).await;
    assert_eq!(first.dead_lettered, 1);
    assert!(h.store.find_queue_entry_by_event_id(events[0].id).await.unwrap().is_none());

    assert!(h.store.find_due(later).await.unwrap().rows.is_empty());
    let second = scheduler.tick_at(later).await;
    assert_eq!(second.selected, 0);
    assert_eq!(second.enqueued, 0);

    let archive = h.store.list_archive_entries().await.unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].status, ArchiveStatus::DeadLetter);
    assert_eq!(archive[0].queue_data.attempts, 1);
    assert!(!h.store.get_email_event(events[0].id).await.unwrap().unwrap().sent);
}

#[tokio::test]
async fn schema_indexes_archive_by_status_and_event() {
    let h = harness().await;
    let indexes: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT name FROM sqlite_master
        WHERE type = 'index' AND tbl_name = 'workflow_queue_archive'
        "#,
    )
    .fetch_all(h.store.pool())
    .await
    .unwrap();

    assert!(indexes.iter().any(|(name,)| name == "idx_archive_status_event"));
}
