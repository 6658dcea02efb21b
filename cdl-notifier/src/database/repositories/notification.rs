//! Notification repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::NotificationJobDbModel;
use crate::database::time::datetime_to_ms;
use crate::domain::{NewNotification, NotificationJob};
use crate::{Error, Result};

/// Notification repository trait.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Queued jobs whose `send_at` is at or before `now`, in store order.
    async fn find_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<NotificationJob>>;

    /// Persist the lifecycle fields of a job. `NotFound` if the job is gone.
    async fn update_job(&self, job: &NotificationJob) -> Result<()>;

    async fn enqueue(&self, request: NewNotification) -> Result<NotificationJob>;
    async fn list_pending(&self) -> Result<Vec<NotificationJob>>;
    async fn list_all(&self) -> Result<Vec<NotificationJob>>;
    async fn get(&self, id: i64) -> Result<NotificationJob>;
}

/// SQLx implementation of NotificationRepository.
pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn rows_into_jobs(rows: Vec<NotificationJobDbModel>) -> Vec<NotificationJob> {
    rows.into_iter().map(NotificationJobDbModel::into_job).collect()
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn find_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<NotificationJob>> {
        let rows = sqlx::query_as::<_, NotificationJobDbModel>(
            "SELECT * FROM notification_job WHERE status = 'queued' AND send_at <= ? ORDER BY id",
        )
        .bind(datetime_to_ms(now))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows_into_jobs(rows))
    }

    async fn update_job(&self, job: &NotificationJob) -> Result<()> {
        let row = NotificationJobDbModel::from_job(job)?;
        let result = sqlx::query(
            r#"
            UPDATE notification_job SET
                status = ?,
                attempts = ?,
                last_attempt = ?,
                sent_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&row.status)
        .bind(row.attempts)
        .bind(row.last_attempt)
        .bind(row.sent_at)
        .bind(row.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("NotificationJob", job.id));
        }
        Ok(())
    }

    async fn enqueue(&self, request: NewNotification) -> Result<NotificationJob> {
        request.validate()?;

        let mut job = NotificationJob::queued(0, request, Utc::now());
        let row = NotificationJobDbModel::from_job(&job)?;
        let result = sqlx::query(
            r#"
            INSERT INTO notification_job (
                kind, recipient, payload, send_at, status, attempts, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.kind)
        .bind(&row.recipient)
        .bind(&row.payload)
        .bind(row.send_at)
        .bind(&row.status)
        .bind(row.attempts)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        job.id = result.last_insert_rowid();
        Ok(job)
    }

    async fn list_pending(&self) -> Result<Vec<NotificationJob>> {
        let rows = sqlx::query_as::<_, NotificationJobDbModel>(
            "SELECT * FROM notification_job WHERE status = 'queued' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows_into_jobs(rows))
    }

    async fn list_all(&self) -> Result<Vec<NotificationJob>> {
        let rows =
            sqlx::query_as::<_, NotificationJobDbModel>("SELECT * FROM notification_job ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows_into_jobs(rows))
    }

    async fn get(&self, id: i64) -> Result<NotificationJob> {
        sqlx::query_as::<_, NotificationJobDbModel>("SELECT * FROM notification_job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(NotificationJobDbModel::into_job)
            .ok_or_else(|| Error::not_found("NotificationJob", id))
    }
}
