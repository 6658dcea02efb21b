//! Channel-specific messages built from a queued job.

use crate::domain::{NotificationJob, NotificationKind};
use crate::{Error, Result};

const DEFAULT_EMAIL_SUBJECT: &str = "Notification";
const DEFAULT_REMINDER_SUBJECT: &str = "Reminder";
const DEFAULT_REMINDER_SMS_BODY: &str = "Reminder";

/// An email ready for the SMTP channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    /// Empty when the job carries no HTML body.
    pub html: String,
}

/// A text message ready for the SMS gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// What to send, and through which channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Email(EmailMessage),
    Sms(SmsMessage),
}

impl Delivery {
    /// Resolve the message for a job.
    ///
    /// Fails for job types no channel handles and for records whose
    /// `payload` is missing or not a message object; both count as a failed
    /// attempt.
    pub fn for_job(job: &NotificationJob) -> Result<Self> {
        let Some(payload) = job.message() else {
            return Err(Error::validation("payload is missing or not an object"));
        };
        let to = job.recipient();

        let delivery = match &job.kind {
            NotificationKind::Email => Self::Email(EmailMessage {
                to: to.to_string(),
                subject: payload.subject_or(DEFAULT_EMAIL_SUBJECT).to_string(),
                text: payload.text_or("").to_string(),
                html: payload.html_or("").to_string(),
            }),
            NotificationKind::Sms => Self::Sms(SmsMessage {
                to: to.to_string(),
                body: payload.text_or("").to_string(),
            }),
            NotificationKind::Reminder if to.contains('@') => Self::Email(EmailMessage {
                to: to.to_string(),
                subject: payload.subject_or(DEFAULT_REMINDER_SUBJECT).to_string(),
                text: payload.text_or("").to_string(),
                html: payload.html_or("").to_string(),
            }),
            NotificationKind::Reminder => Self::Sms(SmsMessage {
                to: to.to_string(),
                body: payload.text_or(DEFAULT_REMINDER_SMS_BODY).to_string(),
            }),
            NotificationKind::Other(kind) => {
                return Err(Error::validation(format!("no channel handles type {kind:?}")));
            }
        };
        Ok(delivery)
    }

    pub fn channel_type(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Sms(_) => "sms",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::Email(m) => &m.to,
            Self::Sms(m) => &m.to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobPayload, NewNotification, NotificationPayload};
    use serde_json::Value;
    use chrono::Utc;

    fn job(kind: NotificationKind, to: &str, payload: NotificationPayload) -> NotificationJob {
        NotificationJob::queued(1, NewNotification::new(kind, to, payload), Utc::now())
    }

    #[test]
    fn test_email_defaults() {
        let delivery = Delivery::for_job(&job(NotificationKind::Email, "a@x.com", Default::default())).unwrap();
        assert_eq!(
            delivery,
            Delivery::Email(EmailMessage {
                to: "a@x.com".to_string(),
                subject: "Notification".to_string(),
                text: String::new(),
                html: String::new(),
            })
        );
    }

    #[test]
    fn test_empty_subject_falls_back() {
        let payload = NotificationPayload {
            subject: Some(String::new()),
            text: Some("Your road test is booked".to_string()),
            html: Some("<p>Your road test is booked</p>".to_string()),
            ..Default::default()
        };
        let Ok(Delivery::Email(message)) = Delivery::for_job(&job(NotificationKind::Email, "a@x.com", payload)) else {
            panic!("expected email delivery");
        };
        assert_eq!(message.subject, "Notification");
        assert_eq!(message.text, "Your road test is booked");
        assert_eq!(message.html, "<p>Your road test is booked</p>");
    }

    #[test]
    fn test_sms_body() {
        let delivery =
            Delivery::for_job(&job(NotificationKind::Sms, "+15551234", NotificationPayload::text("Lesson at 9"))).unwrap();
        assert_eq!(
            delivery,
            Delivery::Sms(SmsMessage {
                to: "+15551234".to_string(),
                body: "Lesson at 9".to_string(),
            })
        );
    }

    #[test]
    fn test_reminder_routing() {
        let email = Delivery::for_job(&job(NotificationKind::Reminder, "s@x.com", Default::default())).unwrap();
        assert_eq!(email.channel_type(), "email");
        let Delivery::Email(message) = email else { unreachable!() };
        assert_eq!(message.subject, "Reminder");

        let sms = Delivery::for_job(&job(NotificationKind::Reminder, "+15551234", Default::default())).unwrap();
        assert_eq!(
            sms,
            Delivery::Sms(SmsMessage {
                to: "+15551234".to_string(),
                body: "Reminder".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_kind_has_no_delivery() {
        let pager = job(NotificationKind::Other("pager".to_string()), "x", Default::default());
        assert!(matches!(Delivery::for_job(&pager), Err(Error::Validation(_))));
    }

    #[test]
    fn test_non_object_payload_has_no_delivery() {
        let mut sms = job(NotificationKind::Sms, "+15551234", NotificationPayload::text("x"));
        sms.payload = JobPayload::Malformed(Value::Null);
        assert!(matches!(Delivery::for_job(&sms), Err(Error::Validation(_))));

        sms.payload = JobPayload::Missing;
        assert!(matches!(Delivery::for_job(&sms), Err(Error::Validation(_))));

        sms.payload = JobPayload::Malformed(Value::String("Lesson at 9".to_string()));
        assert!(Delivery::for_job(&sms).is_err());
    }

    #[test]
    fn test_numeric_recipient_is_used_as_text() {
        let raw = serde_json::json!({
            "id": 2, "type": "sms", "to": 5550100, "payload": { "text": "hi" },
            "sendAt": "2024-05-01", "status": "queued"
        });
        let job: NotificationJob = serde_json::from_value(raw).unwrap();
        assert_eq!(Delivery::for_job(&job).unwrap().recipient(), "5550100");
    }
}
