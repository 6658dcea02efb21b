//! SMS notification channel using the Twilio Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::SmsSender;
use crate::config::lookup_value;
use crate::notification::delivery::SmsMessage;
use crate::utils::http_client::build_http_client;
use crate::{Error, Result};

pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// SMS channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    /// Sending phone number.
    pub from_number: Option<String>,
    /// API base URL, overridable for testing against a local server.
    pub api_base: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_number: None,
            api_base: DEFAULT_TWILIO_API_BASE.to_string(),
            timeout_secs: 30,
        }
    }
}

impl SmsConfig {
    /// Supported env vars:
    /// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE`
    /// - `TWILIO_API_BASE`
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            account_sid: lookup_value(lookup, "TWILIO_ACCOUNT_SID"),
            auth_token: lookup_value(lookup, "TWILIO_AUTH_TOKEN"),
            from_number: lookup_value(lookup, "TWILIO_PHONE"),
            api_base: lookup_value(lookup, "TWILIO_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            timeout_secs: defaults.timeout_secs,
        }
    }

    pub fn from_env_or_default() -> Self {
        Self::from_lookup(&crate::config::env_lookup)
    }

    /// Account SID, auth token and sender number are all present.
    pub fn is_configured(&self) -> bool {
        self.account_sid.is_some() && self.auth_token.is_some() && self.from_number.is_some()
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base, account_sid)
    }
}

/// SMS notification channel.
pub struct SmsChannel {
    config: SmsConfig,
    client: Client,
}

impl SmsChannel {
    /// Create a new SMS channel.
    pub fn new(config: SmsConfig) -> Self {
        let client = build_http_client(Duration::from_secs(config.timeout_secs));
        Self { config, client }
    }
}

#[async_trait]
impl SmsSender for SmsChannel {
    fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<()> {
        let (Some(account_sid), Some(auth_token), Some(from)) = (
            self.config.account_sid.as_deref(),
            self.config.auth_token.as_deref(),
            self.config.from_number.as_deref(),
        ) else {
            info!(to = %message.to, body = %message.body, "SMS gateway not configured; message not sent");
            return Err(Error::channel("sms", "Twilio credentials are not configured"));
        };

        let response = self
            .client
            .post(self.config.messages_url(account_sid))
            .basic_auth(account_sid, Some(auth_token))
            .form(&[("From", from), ("To", message.to.as_str()), ("Body", message.body.as_str())])
            .send()
            .await
            .map_err(|e| Error::channel("sms", format!("Twilio request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(to = %message.to, %status, "Twilio send failed: {}", body);
            return Err(Error::channel(
                "sms",
                format!("Twilio send failed: {} - {}", status, body),
            ));
        }

        debug!(to = %message.to, "SMS notification sent");
        Ok(())
    }
}
