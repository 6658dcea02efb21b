//! Repository layer for notification jobs.
//!
//! The dispatch worker only needs [`NotificationRepository::find_due_jobs`]
//! and [`NotificationRepository::update_job`]; the remaining operations serve
//! producers and tooling.

pub mod document;
pub mod notification;

pub use document::*;
pub use notification::*;
