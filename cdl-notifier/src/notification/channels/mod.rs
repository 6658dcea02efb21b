//! Notification channels.
//!
//! This module provides the delivery channels used by the dispatch worker:
//! - Email (SMTP)
//! - SMS (Twilio Messages API)

mod email;
mod sms;

pub use email::{EmailChannel, EmailConfig};
pub use sms::{SmsChannel, SmsConfig};

use std::sync::Arc;

use async_trait::async_trait;

use super::delivery::{Delivery, EmailMessage, SmsMessage};
use crate::Result;

/// Sends email messages.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str {
        "email"
    }

    /// Check if the channel has enough configuration to send.
    fn is_enabled(&self) -> bool;

    /// Send one message. Any error counts as a failed attempt.
    async fn send_email(&self, message: &EmailMessage) -> Result<()>;
}

/// Sends text messages.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str {
        "sms"
    }

    /// Check if the channel has enough configuration to send.
    fn is_enabled(&self) -> bool;

    /// Send one message. Any error counts as a failed attempt.
    async fn send_sms(&self, message: &SmsMessage) -> Result<()>;
}

/// The set of channels a worker dispatches through.
#[derive(Clone)]
pub struct Channels {
    pub email: Arc<dyn EmailSender>,
    pub sms: Arc<dyn SmsSender>,
}

impl Channels {
    pub fn new(email: Arc<dyn EmailSender>, sms: Arc<dyn SmsSender>) -> Self {
        Self { email, sms }
    }

    /// Route a delivery to its channel.
    pub async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        match delivery {
            Delivery::Email(message) => self.email.send_email(message).await,
            Delivery::Sms(message) => self.sms.send_sms(message).await,
        }
    }
}

impl std::fmt::Debug for Channels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channels")
            .field("email_enabled", &self.email.is_enabled())
            .field("sms_enabled", &self.sms.is_enabled())
            .finish()
    }
}
