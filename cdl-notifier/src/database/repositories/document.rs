//! Notification repository over the shared JSON data document.
//!
//! Jobs live in the `notifications` array next to collections this crate
//! never touches. Every write re-reads the document, replaces or appends a
//! single record and saves the result, so records added by other producers
//! since the last read survive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::NotificationRepository;
use crate::database::document::{Document, DocumentStore};
use crate::domain::{NewNotification, NotificationJob, NotificationStatus};
use crate::{Error, Result};

/// Name of the job collection in the data document.
pub const NOTIFICATIONS_COLLECTION: &str = "notifications";

/// Document-backed implementation of NotificationRepository.
pub struct DocumentNotificationRepository<S> {
    store: S,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl<S: DocumentStore> DocumentNotificationRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn load_jobs(&self) -> Result<Vec<NotificationJob>> {
        let document = self.store.load().await?;
        Ok(parse_jobs(&document))
    }
}

/// Parse the job collection.
///
/// A record is skipped only when it lacks a numeric `id` or a string
/// `status`. Anything else loads, so a queued job with a bad payload or
/// recipient still reaches the worker and is failed there instead of sitting
/// in the queue forever.
fn parse_jobs(document: &Document) -> Vec<NotificationJob> {
    document
        .collection(NOTIFICATIONS_COLLECTION)
        .iter()
        .filter_map(|record| {
            let queued = record.get("status").and_then(Value::as_str) == Some("queued");
            match serde_json::from_value::<NotificationJob>(record.clone()) {
                Ok(job) => {
                    if job.is_unscheduled() {
                        warn!(
                            job.id = job.id,
                            send_at = ?record.get("sendAt"),
                            "Queued notification has no usable sendAt; it will not be dispatched"
                        );
                    }
                    Some(job)
                }
                Err(e) if queued => {
                    warn!(
                        record.id = ?record.get("id"),
                        error = %e,
                        "Skipping queued notification record without a usable id"
                    );
                    None
                }
                Err(e) => {
                    debug!(
                        record.id = ?record.get("id"),
                        error = %e,
                        "Skipping record that is not a notification job"
                    );
                    None
                }
            }
        })
        .collect()
}

fn record_id(record: &Value) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

#[async_trait]
impl<S: DocumentStore> NotificationRepository for DocumentNotificationRepository<S> {
    async fn find_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<NotificationJob>> {
        let jobs = self.load_jobs().await?;
        Ok(jobs.into_iter().filter(|job| job.is_due(now)).collect())
    }

    async fn update_job(&self, job: &NotificationJob) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.store.load().await?;
        let record = serde_json::to_value(job)?;
        let slot = document
            .collection_mut(NOTIFICATIONS_COLLECTION)?
            .iter_mut()
            .find(|existing| record_id(existing) == Some(job.id))
            .ok_or_else(|| Error::not_found("NotificationJob", job.id))?;
        *slot = record;

        self.store.save(&document).await?;
        trace!(job.id = job.id, status = %job.status, "Notification job saved");
        Ok(())
    }

    async fn enqueue(&self, request: NewNotification) -> Result<NotificationJob> {
        request.validate()?;
        let _guard = self.write_lock.lock().await;

        let mut document = self.store.load().await?;
        let id = document.next_id();
        let job = NotificationJob::queued(id, request, Utc::now());
        let record = serde_json::to_value(&job)?;
        document.collection_mut(NOTIFICATIONS_COLLECTION)?.push(record);

        self.store.save(&document).await?;
        debug!(job.id = id, kind = %job.kind, "Notification job enqueued");
        Ok(job)
    }

    async fn list_pending(&self) -> Result<Vec<NotificationJob>> {
        let jobs = self.load_jobs().await?;
        Ok(jobs
            .into_iter()
            .filter(|job| job.status == NotificationStatus::Queued)
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<NotificationJob>> {
        self.load_jobs().await
    }

    async fn get(&self, id: i64) -> Result<NotificationJob> {
        self.load_jobs()
            .await?
            .into_iter()
            .find(|job| job.id == id)
            .ok_or_else(|| Error::not_found("NotificationJob", id))
    }
}
