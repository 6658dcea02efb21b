//! Domain layer: the notification job entity and its lifecycle rules.

pub mod notification;

pub use notification::{
    DEFAULT_MAX_ATTEMPTS, JobPayload, NewNotification, NotificationJob, NotificationKind, NotificationPayload,
    NotificationStatus,
};
