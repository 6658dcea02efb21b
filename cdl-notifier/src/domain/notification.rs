//! Notification job entity.
//!
//! A job is a single queued email/SMS/reminder. Producers append jobs with
//! status `queued`; the dispatch worker is the only component that moves a
//! job through its lifecycle:
//!
//! ```text
//! queued --(delivered)--------------------> sent    [terminal]
//! queued --(failed, attempts < max)--------> queued
//! queued --(failed, attempts >= max)-------> failed  [terminal]
//! ```
//!
//! The serialized shape matches the records stored in the shared JSON
//! document (`sendAt`, `lastAttempt`, `sentAt`, `created_at`), and any field
//! this crate does not know about is carried through untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Number of attempts after which an undeliverable job is marked `failed`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Channel selector of a job (`type` in the stored record).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    Email,
    Sms,
    /// Routed to email when the recipient looks like an address, SMS otherwise.
    Reminder,
    /// A type written by some producer that no channel handles.
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Reminder => "reminder",
            Self::Other(s) => s,
        }
    }

    /// Placeholder for a record without a `type`.
    pub fn unset() -> Self {
        Self::Other(String::new())
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Other(s) if s.is_empty())
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "email" => Self::Email,
            "sms" => Self::Sms,
            "reminder" => Self::Reminder,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for NotificationKind {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<NotificationKind> for String {
    fn from(value: NotificationKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
    /// Status owned by another producer (e.g. `scheduled` report entries).
    Other(String),
}

impl NotificationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    /// `sent` and `failed` are never left once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl From<String> for NotificationStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<NotificationStatus> for String {
    fn from(value: NotificationStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message content of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Subject, or `default` when missing or empty.
    pub fn subject_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(self.subject.as_deref()).unwrap_or(default)
    }

    /// Plain-text body, or `default` when missing or empty.
    pub fn text_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(self.text.as_deref()).unwrap_or(default)
    }

    /// HTML body, or `default` when missing or empty.
    pub fn html_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(self.html.as_deref()).unwrap_or(default)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// `payload` of a stored job, kept as written when it is not a message object.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum JobPayload {
    Message(NotificationPayload),
    /// Present but unusable (`null`, a string, an array, or an object with
    /// mistyped fields). Dispatching such a job counts as a failed attempt.
    Malformed(Value),
    /// No `payload` key at all.
    #[default]
    Missing,
}

impl JobPayload {
    pub fn from_value(value: Value) -> Self {
        if !value.is_object() {
            return Self::Malformed(value);
        }
        match serde_json::from_value::<NotificationPayload>(value.clone()) {
            Ok(payload) => Self::Message(payload),
            Err(_) => Self::Malformed(value),
        }
    }

    pub fn message(&self) -> Option<&NotificationPayload> {
        match self {
            Self::Message(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<NotificationPayload> for JobPayload {
    fn from(value: NotificationPayload) -> Self {
        Self::Message(value)
    }
}

impl Serialize for JobPayload {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Message(payload) => payload.serialize(serializer),
            Self::Malformed(value) => value.serialize(serializer),
            Self::Missing => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for JobPayload {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// A notification job as stored in the `notifications` collection.
///
/// Only `id` and `status` must be well-formed for a record to load. Other
/// fields are read the way a loosely typed producer may have written them:
/// a numeric `to` becomes a string, a missing or non-numeric `attempts` is 0,
/// and a `sendAt` that is missing or not a recognizable date leaves the job
/// unscheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub id: i64,
    #[serde(
        rename = "type",
        default = "NotificationKind::unset",
        deserialize_with = "lenient::kind",
        skip_serializing_if = "NotificationKind::is_unset"
    )]
    pub kind: NotificationKind,
    /// Recipient address or phone number. Legacy producers may write `null`.
    #[serde(default, deserialize_with = "lenient::recipient")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "JobPayload::is_missing")]
    pub payload: JobPayload,
    /// `None` when missing or unparseable; such a job is never due.
    #[serde(
        default,
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub send_at: Option<DateTime<Utc>>,
    pub status: NotificationStatus,
    #[serde(default, deserialize_with = "lenient::count")]
    pub attempts: u32,
    #[serde(
        default,
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "created_at",
        with = "timestamp::lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields written by other producers, preserved on write-back.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationJob {
    /// Build a freshly queued job from a producer request.
    pub fn queued(id: i64, request: NewNotification, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: request.kind,
            to: Some(request.to),
            payload: JobPayload::Message(request.payload),
            send_at: Some(request.send_at.unwrap_or(now)),
            status: NotificationStatus::Queued,
            attempts: 0,
            last_attempt: None,
            sent_at: None,
            created_at: Some(now),
            extra: Map::new(),
        }
    }

    /// Recipient, or an empty string when the record has none.
    pub fn recipient(&self) -> &str {
        self.to.as_deref().unwrap_or_default()
    }

    /// Message content, unless the stored payload is missing or malformed.
    pub fn message(&self) -> Option<&NotificationPayload> {
        self.payload.message()
    }

    /// Queued and scheduled at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == NotificationStatus::Queued && self.send_at.is_some_and(|at| at <= now)
    }

    /// Queued but without a usable `sendAt`.
    pub fn is_unscheduled(&self) -> bool {
        self.status == NotificationStatus::Queued && self.send_at.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Count a new delivery attempt. Called before the channel is invoked so a
    /// crash mid-delivery still shows up in the attempt count.
    pub fn begin_attempt(&mut self, at: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt = Some(at);
    }

    /// Apply the outcome of the current attempt and return the new status.
    pub fn finish_attempt(
        &mut self,
        delivered: bool,
        at: DateTime<Utc>,
        max_attempts: u32,
    ) -> &NotificationStatus {
        if delivered {
            self.status = NotificationStatus::Sent;
            self.sent_at = Some(at);
        } else if self.attempts >= max_attempts {
            self.status = NotificationStatus::Failed;
        } else {
            self.status = NotificationStatus::Queued;
        }
        &self.status
    }
}

/// Producer request for a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub to: String,
    #[serde(default)]
    pub payload: NotificationPayload,
    /// Defaults to the enqueue time.
    #[serde(default, with = "timestamp::option")]
    pub send_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, to: impl Into<String>, payload: NotificationPayload) -> Self {
        Self {
            kind,
            to: to.into(),
            payload,
            send_at: None,
        }
    }

    pub fn email(to: impl Into<String>, subject: impl Into<String>, text: impl Into<String>) -> Self {
        let payload = NotificationPayload {
            subject: Some(subject.into()),
            text: Some(text.into()),
            ..Default::default()
        };
        Self::new(NotificationKind::Email, to, payload)
    }

    pub fn sms(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(NotificationKind::Sms, to, NotificationPayload::text(text))
    }

    pub fn send_at(mut self, send_at: DateTime<Utc>) -> Self {
        self.send_at = Some(send_at);
        self
    }

    /// Both `type` and `to` are required.
    pub fn validate(&self) -> Result<()> {
        if self.kind.as_str().trim().is_empty() {
            return Err(Error::validation("type and to required"));
        }
        if self.to.trim().is_empty() {
            return Err(Error::validation("type and to required"));
        }
        Ok(())
    }
}

/// Loose readers for fields producers write with varying JSON types.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::NotificationKind;

    pub fn kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NotificationKind, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => NotificationKind::parse(&s),
            Value::Null => NotificationKind::unset(),
            other => NotificationKind::Other(other.to_string()),
        })
    }

    pub fn recipient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let count = value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u64))
            .unwrap_or(0);
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

/// ISO-8601 timestamps, written with millisecond precision and a `Z` suffix
/// (the format `Date.prototype.toISOString` produces).
pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    /// Date-time layouts without an offset; read as local time.
    const LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Parse the ISO-8601 forms producers write.
    ///
    /// - full RFC 3339 with `Z` or an offset
    /// - date and time without an offset, in local time
    /// - a bare date, as midnight UTC
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Some(dt.with_timezone(&Utc));
        }
        for layout in LOCAL_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
                return Local
                    .from_local_datetime(&naive)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc));
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    /// A string date, or a number of epoch milliseconds.
    pub fn from_value(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(s) => parse(s),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .and_then(DateTime::from_timestamp_millis),
            _ => None,
        }
    }

    fn serialize_option<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&format(dt)),
            None => serializer.serialize_none(),
        }
    }

    /// Optional timestamp; an unparseable string is an error.
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
            serialize_option(value, serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|s| {
                parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {s:?}")))
            })
            .transpose()
        }
    }

    /// Optional timestamp; anything unreadable becomes `None`.
    pub mod lenient {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
            serialize_option(value, serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            let value = Value::deserialize(deserializer)?;
            Ok(from_value(&value))
        }
    }
}
