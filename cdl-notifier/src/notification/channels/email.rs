//! Email notification channel using SMTP.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use super::EmailSender;
use crate::config::{lookup_value, parse_bool_or, parse_or};
use crate::notification::delivery::EmailMessage;
use crate::utils::http_client::install_rustls_provider;
use crate::{Error, Result};

/// Email channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    /// SMTP server host. The channel is disabled without one.
    pub host: Option<String>,
    /// SMTP server port.
    pub port: u16,
    /// SMTP username.
    pub username: Option<String>,
    /// SMTP password.
    pub password: Option<String>,
    /// Upgrade the connection with STARTTLS.
    pub use_tls: bool,
    /// Sender address.
    pub from_address: Option<String>,
    /// Connection and command timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            use_tls: true,
            from_address: None,
            timeout_secs: 30,
        }
    }
}

impl EmailConfig {
    /// Supported env vars:
    /// - `EMAIL_HOST`, `EMAIL_PORT`
    /// - `EMAIL_USER`, `EMAIL_PASS`
    /// - `EMAIL_USE_TLS`
    /// - `DEFAULT_FROM_EMAIL`
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            host: lookup_value(lookup, "EMAIL_HOST"),
            port: parse_or(lookup, "EMAIL_PORT", defaults.port),
            username: lookup_value(lookup, "EMAIL_USER"),
            password: lookup_value(lookup, "EMAIL_PASS"),
            use_tls: parse_bool_or(lookup, "EMAIL_USE_TLS", defaults.use_tls),
            from_address: lookup_value(lookup, "DEFAULT_FROM_EMAIL"),
            timeout_secs: defaults.timeout_secs,
        }
    }

    pub fn from_env_or_default() -> Self {
        Self::from_lookup(&crate::config::env_lookup)
    }
}

/// Email notification channel.
pub struct EmailChannel {
    config: EmailConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailChannel {
    /// Create a new Email channel.
    ///
    /// Without a host, or with a host the SMTP transport rejects, the channel
    /// is created disabled and every send fails.
    pub fn new(config: EmailConfig) -> Self {
        install_rustls_provider();

        let transport = match config.host.as_deref() {
            Some(host) => match Self::build_transport(&config, host) {
                Ok(transport) => Some(transport),
                Err(e) => {
                    warn!(host = %host, error = %e, "Invalid SMTP settings; email channel disabled");
                    None
                }
            },
            None => {
                debug!("EMAIL_HOST not set; email channel disabled");
                None
            }
        };
        Self { config, transport }
    }

    fn build_transport(config: &EmailConfig, host: &str) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| Error::config(format!("SMTP relay configuration error: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let Some(username) = &config.username {
            let password = config.password.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        Ok(builder.build())
    }

    /// Build the MIME message: plain text, or plain + HTML alternatives.
    fn build_message(&self, message: &EmailMessage) -> Result<Message> {
        let from_address = self
            .config
            .from_address
            .as_deref()
            .ok_or_else(|| Error::channel("email", "DEFAULT_FROM_EMAIL is not set"))?;
        let from: Mailbox = from_address
            .parse()
            .map_err(|e| Error::channel("email", format!("Invalid from address: {e}")))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| Error::channel("email", format!("Invalid recipient address: {e}")))?;

        let builder = Message::builder().from(from).to(to).subject(message.subject.as_str());

        let built = if message.html.is_empty() {
            builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.text.clone())
        } else {
            builder.multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                message.html.clone(),
            ))
        };

        built.map_err(|e| Error::channel("email", format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl EmailSender for EmailChannel {
    fn is_enabled(&self) -> bool {
        self.transport.is_some() && self.config.from_address.is_some()
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        let Some(transport) = &self.transport else {
            return Err(Error::channel("email", "SMTP host is not configured"));
        };

        let email = self.build_message(message)?;
        transport.send(email).await.map_err(|e| {
            warn!(to = %message.to, error = %e, "Email send failed");
            Error::channel("email", format!("SMTP send failed: {e}"))
        })?;

        debug!(to = %message.to, subject = %message.subject, "Email notification sent");
        Ok(())
    }
}
