//! Notification dispatch.
//!
//! Jobs are queued by producers (the web application, or
//! [`NotificationRepository::enqueue`](crate::database::repositories::NotificationRepository::enqueue))
//! and delivered by the [`DispatchWorker`] through email or SMS.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cdl_notifier::database::{JsonFileStore, repositories::DocumentNotificationRepository};
//! use cdl_notifier::notification::{Channels, DispatchWorker, WorkerConfig};
//! use cdl_notifier::notification::channels::{EmailChannel, EmailConfig, SmsChannel, SmsConfig};
//!
//! let repo = Arc::new(DocumentNotificationRepository::new(JsonFileStore::new("server-data.json")));
//! let channels = Channels::new(
//!     Arc::new(EmailChannel::new(EmailConfig::from_env_or_default())),
//!     Arc::new(SmsChannel::new(SmsConfig::from_env_or_default())),
//! );
//! let worker = Arc::new(DispatchWorker::new(repo, channels, WorkerConfig::default()));
//! worker.start(std::time::Duration::from_secs(30));
//! ```

pub mod channels;
pub mod delivery;
pub mod worker;

pub use channels::{Channels, EmailSender, SmsSender};
pub use delivery::{Delivery, EmailMessage, SmsMessage};
pub use worker::{CycleReport, DispatchWorker, WorkerConfig, WorkerStats};
