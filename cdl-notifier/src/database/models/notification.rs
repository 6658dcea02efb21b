//! Notification job database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Result;
use crate::database::time::{datetime_to_ms, ms_to_datetime, opt_datetime_to_ms, opt_ms_to_datetime};
use chrono::Utc;
use serde_json::Value;

use crate::domain::{JobPayload, NotificationJob, NotificationKind, NotificationStatus};

/// Row of the `notification_job` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationJobDbModel {
    pub id: i64,
    /// email, sms, reminder, or a producer-specific value
    pub kind: String,
    pub recipient: Option<String>,
    /// JSON blob of the message payload
    pub payload: String,
    /// `NULL` for a job without a usable schedule; such rows are never due.
    pub send_at: Option<i64>,
    pub status: String,
    pub attempts: i64,
    pub last_attempt: Option<i64>,
    pub sent_at: Option<i64>,
    pub created_at: i64,
}

impl NotificationJobDbModel {
    /// Convert a row to a job. Never fails: a payload column that is not
    /// valid JSON is carried as a malformed payload so the worker can fail
    /// the job instead of leaving it queued.
    pub fn into_job(self) -> NotificationJob {
        let payload = if self.payload.trim().is_empty() {
            JobPayload::Missing
        } else {
            match serde_json::from_str::<Value>(&self.payload) {
                Ok(value) => JobPayload::from_value(value),
                Err(_) => JobPayload::Malformed(Value::String(self.payload)),
            }
        };

        NotificationJob {
            id: self.id,
            kind: NotificationKind::parse(&self.kind),
            to: self.recipient,
            payload,
            send_at: opt_ms_to_datetime(self.send_at),
            status: NotificationStatus::parse(&self.status),
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            last_attempt: opt_ms_to_datetime(self.last_attempt),
            sent_at: opt_ms_to_datetime(self.sent_at),
            created_at: Some(ms_to_datetime(self.created_at)),
            extra: Default::default(),
        }
    }

    pub fn from_job(job: &NotificationJob) -> Result<Self> {
        Ok(Self {
            id: job.id,
            kind: job.kind.as_str().to_string(),
            recipient: job.to.clone(),
            payload: match &job.payload {
                JobPayload::Missing => String::new(),
                payload => serde_json::to_string(payload)?,
            },
            send_at: opt_datetime_to_ms(job.send_at),
            status: job.status.as_str().to_string(),
            attempts: i64::from(job.attempts),
            last_attempt: opt_datetime_to_ms(job.last_attempt),
            sent_at: opt_datetime_to_ms(job.sent_at),
            created_at: datetime_to_ms(job.created_at.or(job.send_at).unwrap_or_else(Utc::now)),
        })
    }
}
