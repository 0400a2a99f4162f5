/// Workflow email scheduler
///
/// Each tick runs three phases in order:
/// 1. Select: unsent email events due at `now` that are not already queued
/// 2. Enqueue: one queue entry per selected event, failures isolated per event
/// 3. Drain: every queued entry in FIFO order is sent, its event flagged as
///    sent, archived, then removed from the queue
///
/// Ticks never overlap. Timer ticks are driven by a tokio-cron-scheduler
/// repeated job and skip themselves while a previous tick is still running.

use crate::config::SchedulerConfig;
use crate::email::EmailSender;
use crate::error::WorkflowError;
use crate::store::{MalformedRow, Scan, Store};
use crate::workflow::types::{ArchiveStatus, EmailEvent, QueueEntry};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Outcome of one tick
#[derive(Debug, Default, Clone, Serialize)]
pub struct TickReport {
    /// Due events not yet queued
    pub selected: usize,
    /// Queue entries created this tick
    pub enqueued: usize,
    /// Emails handed to the sender successfully
    pub sent: usize,
    /// Entries whose event was already flagged as sent, archived without resending
    pub resumed: usize,
    /// Entries archived as sent and removed from the queue
    pub archived: usize,
    /// Entries moved to the dead-letter archive
    pub dead_lettered: usize,
    /// Per-entry drain failures; the entries stay queued unless dead-lettered
    pub failures: Vec<DrainFailure>,
    /// Stored rows that could not be decoded and were left untouched
    pub skipped: Vec<MalformedRow>,
}

/// A queue entry the drain phase could not fully process
#[derive(Debug, Clone, Serialize)]
pub struct DrainFailure {
    pub queue_id: Uuid,
    pub event_id: Uuid,
    pub recipient: String,
    pub error: String,
}

impl TickReport {
    fn is_idle(&self) -> bool {
        self.selected == 0
            && self.archived == 0
            && self.dead_lettered == 0
            && self.failures.is_empty()
            && self.skipped.is_empty()
    }

    /// Keep malformed rows for the report and hand back the decoded ones
    fn decoded<T>(&mut self, scan: Scan<T>) -> Vec<T> {
        self.skipped.extend(scan.malformed);
        scan.rows
    }

    fn fail(&mut self, entry: &QueueEntry, error: &WorkflowError) {
        self.failures.push(DrainFailure {
            queue_id: entry.id,
            event_id: entry.event_id(),
            recipient: entry.payload.send_to.clone(),
            error: error.to_string(),
        });
    }
}

/// Owns the tick logic and its collaborators
pub struct Scheduler {
    store: Arc<dyn Store>,
    sender: Arc<dyn EmailSender>,
    config: SchedulerConfig,
    /// Held for the whole duration of a tick
    tick_lock: Mutex<()>,
    /// Set by `SchedulerHandle::stop`; timer ticks check it before starting
    stopped: AtomicBool,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        sender: Arc<dyn EmailSender>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sender,
            config,
            tick_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one tick now, waiting for any tick already in progress
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick treating `now` as the current time
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        self.run_tick(now).await
    }

    /// Timer entry point: skipped when stopped or when a tick is still running
    async fn timer_tick(&self) -> Option<TickReport> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        let Ok(_guard) = self.tick_lock.try_lock() else {
            tracing::warn!("⏭️ Previous tick still running, skipping this one");
            return None;
        };
        // stop() may have landed while we were acquiring the lock
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.run_tick(Utc::now()).await)
    }

    async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let due = self.select_into(now, &mut report).await;
        report.selected = due.len();
        report.enqueued = self.enqueue(&due, now).await;
        self.drain(&mut report).await;

        if report.is_idle() {
            tracing::debug!("⏰ Tick at {}: nothing to do", now.to_rfc3339());
        } else {
            tracing::info!(
                "⏰ Tick at {}: selected={} enqueued={} sent={} resumed={} archived={} \
                 dead_lettered={} failed={} skipped={}",
                now.to_rfc3339(),
                report.selected,
                report.enqueued,
                report.sent,
                report.resumed,
                report.archived,
                report.dead_lettered,
                report.failures.len(),
                report.skipped.len()
            );
        }

        report
    }

    /// Due, unsent events that have no queue entry yet
    ///
    /// Read-only: selecting twice yields the same events and creates nothing.
    pub async fn select(&self, now: DateTime<Utc>) -> Vec<EmailEvent> {
        self.select_into(now, &mut TickReport::default()).await
    }

    async fn select_into(&self, now: DateTime<Utc>, report: &mut TickReport) -> Vec<EmailEvent> {
        let candidates = match self.store.find_due(now).await {
            Ok(scan) => report.decoded(scan),
            Err(e) => {
                tracing::warn!("⚠️ Could not load due email events: {}", e);
                return Vec::new();
            }
        };

        let mut selected = Vec::with_capacity(candidates.len());
        for event in candidates {
            match self.store.is_event_queued(event.id).await {
                Ok(true) => {
                    tracing::debug!(
                        "⏭️ Email event {} is already in the queue. Skipping.",
                        event.id
                    );
                }
                Ok(false) => selected.push(event),
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Queue lookup failed for email event {}: {}",
                        event.id,
                        e
                    );
                }
            }
        }

        selected
    }

    /// Create one queue entry per event; returns how many were stored
    pub async fn enqueue(&self, events: &[EmailEvent], now: DateTime<Utc>) -> usize {
        let mut enqueued = 0;
        for event in events {
            let entry = QueueEntry::new(event.clone(), now);
            match self.store.insert_queue_entry(&entry).await {
                Ok(()) => {
                    tracing::info!("📥 Email event {} added to queue as {}", event.id, entry.id);
                    enqueued += 1;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Could not enqueue email event {}: {}", event.id, e);
                }
            }
        }
        enqueued
    }

    /// Process every queued entry, including leftovers from earlier ticks
    pub async fn drain(&self, report: &mut TickReport) {
        let entries = match self.store.list_queue_entries().await {
            Ok(scan) => report.decoded(scan),
            Err(e) => {
                tracing::warn!("⚠️ Could not read the queue: {}", e);
                return;
            }
        };

        for entry in entries {
            self.drain_entry(entry, report).await;
        }
    }

    async fn drain_entry(&self, entry: QueueEntry, report: &mut TickReport) {
        let event_id = entry.event_id();

        let source = match self.store.get_email_event(event_id).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("⚠️ Could not load email event {}: {}", event_id, e);
                None
            }
        };

        if source.as_ref().is_some_and(|event| event.sent) {
            // sent by an earlier tick that failed before archiving
            tracing::info!(
                "↩️ Email event {} already sent, finishing queue item {}",
                event_id,
                entry.id
            );
            report.resumed += 1;
        } else {
            if let Err(e) = self.send(&entry.payload).await {
                self.handle_send_failure(entry, e, report).await;
                return;
            }
            tracing::info!(
                "📤 Queue item {} processed and email with id of {} has been sent",
                entry.id,
                event_id
            );
            report.sent += 1;
            self.mark_sent(event_id, source).await;
        }

        if self.archive_and_remove(&entry, ArchiveStatus::Sent, report).await {
            report.archived += 1;
        }
    }

    async fn send(&self, email: &EmailEvent) -> crate::error::Result<()> {
        let timeout = self.config.send_timeout();
        let send = self.sender.send(&email.send_to, &email.subject, &email.body);
        match tokio::time::timeout(timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::Send(format!(
                "sending to {} timed out after {:?}",
                email.send_to, timeout
            ))),
        }
    }

    async fn handle_send_failure(
        &self,
        mut entry: QueueEntry,
        error: WorkflowError,
        report: &mut TickReport,
    ) {
        let exhausted = entry.record_failure(&error.to_string(), self.config.max_tries());
        report.fail(&entry, &error);

        if exhausted {
            tracing::error!(
                "☠️ Queue item {} for {} failed {} times, moving to dead letters: {}",
                entry.id,
                entry.payload.send_to,
                entry.attempts,
                error
            );
            if self.archive_and_remove(&entry, ArchiveStatus::DeadLetter, report).await {
                report.dead_lettered += 1;
            }
            return;
        }

        tracing::warn!(
            "⚠️ Sending queue item {} to {} failed (attempt {}), will retry next tick: {}",
            entry.id,
            entry.payload.send_to,
            entry.attempts,
            error
        );
        if let Err(e) = self.store.update_queue_entry(&entry).await {
            tracing::warn!(
                "⚠️ Could not record failed attempt for queue item {}: {}",
                entry.id,
                e
            );
        }
    }

    async fn mark_sent(&self, event_id: Uuid, source: Option<EmailEvent>) {
        let Some(mut event) = source else {
            tracing::warn!("⚠️ Email event {} not found, cannot mark it as sent", event_id);
            return;
        };
        event.mark_sent();
        if let Err(e) = self.store.update_email_event(&event).await {
            tracing::warn!("⚠️ Could not mark email event {} as sent: {}", event_id, e);
        }
    }

    /// Archive first, then delete; returns true once the entry left the queue
    async fn archive_and_remove(
        &self,
        entry: &QueueEntry,
        status: ArchiveStatus,
        report: &mut TickReport,
    ) -> bool {
        match self.store.insert_archive_entry(entry, status).await {
            Ok(archived) => {
                tracing::info!(
                    "🗄️ Added queue item {} to archive as #{} ({})",
                    entry.id,
                    archived.id,
                    status
                );
            }
            Err(e) => {
                tracing::warn!("⚠️ Could not archive queue item {}: {}", entry.id, e);
                report.fail(entry, &e);
                return false;
            }
        }

        if let Err(e) = self.store.delete_queue_entry(entry.id).await {
            tracing::warn!("⚠️ Could not remove queue item {}: {}", entry.id, e);
            report.fail(entry, &e);
            return false;
        }
        tracing::info!("🧹 Removed item {} from queue", entry.id);
        true
    }

    /// Start ticking every `tick_interval` in the background
    pub async fn start(self: Arc<Self>) -> Result<SchedulerHandle> {
        let interval = self.config.tick_interval();
        tracing::info!("⏰ Starting workflow email scheduler (every {:?})", interval);

        self.stopped.store(false, Ordering::SeqCst);
        let job_scheduler = JobScheduler::new().await?;

        let scheduler = Arc::clone(&self);
        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let scheduler = Arc::clone(&scheduler);
            Box::pin(async move {
                scheduler.timer_tick().await;
            })
        })?;

        let job_id = job_scheduler.add(job).await?;
        job_scheduler.start().await?;

        tracing::info!("✅ Workflow email scheduler started");
        Ok(SchedulerHandle {
            scheduler: self,
            job_scheduler,
            job_id,
        })
    }
}

/// Running scheduler; dropping it without `stop` leaves the timer running
pub struct SchedulerHandle {
    scheduler: Arc<Scheduler>,
    job_scheduler: JobScheduler,
    job_id: Uuid,
}

impl SchedulerHandle {
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Prevent further ticks and wait for an in-progress tick to finish
    pub async fn stop(mut self) -> Result<()> {
        tracing::info!("⏹️ Stopping workflow email scheduler");
        self.scheduler.stopped.store(true, Ordering::SeqCst);

        if let Err(e) = self.job_scheduler.remove(&self.job_id).await {
            tracing::warn!("⚠️ Failed to remove scheduler job {}: {}", self.job_id, e);
        }
        self.job_scheduler.shutdown().await?;

        let _guard = self.scheduler.tick_lock.lock().await;
        tracing::info!("✅ Workflow email scheduler stopped");
        Ok(())
    }
}
