//! Process configuration.
//!
//! Everything is read from environment variables (a `.env` file is loaded
//! first by the binary). Loading goes through a lookup closure so tests can
//! supply values without touching the process environment.
//!
//! Empty values count as unset. Numbers that fail to parse fall back to the
//! default with a warning.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::domain::DEFAULT_MAX_ATTEMPTS;
use crate::notification::channels::{EmailConfig, SmsConfig};
use crate::notification::worker::WorkerConfig;

/// Default interval between dispatch cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_DATA_FILE: &str = "server-data.json";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:notifications.db?mode=rwc";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Value of `key`, trimmed, or `None` when unset or blank.
pub fn lookup_value<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse `key`, keeping `default` when unset or invalid.
pub fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup_value(lookup, key) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(e) => {
            warn!(key, value = %raw, error = %e, default = %default, "Invalid config value; using default");
            default
        }
    }
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
pub fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup_value(lookup, key) else {
        return default;
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            warn!(key, value = %raw, default, "Invalid boolean config value; using default");
            default
        }
    }
}

/// Process environment lookup.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Where notification jobs are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// The JSON data document shared with the web application.
    Json { path: PathBuf },
    /// A SQLite database.
    Sqlite { url: String },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Json {
            path: PathBuf::from(DEFAULT_DATA_FILE),
        }
    }
}

impl StoreConfig {
    /// Supported env vars:
    /// - `NOTIFY_STORE` (`json` or `sqlite`)
    /// - `NOTIFY_DATA_FILE` (JSON store path)
    /// - `DATABASE_URL` (SQLite store URL)
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind = lookup_value(lookup, "NOTIFY_STORE").map(|v| v.to_ascii_lowercase());
        match kind.as_deref() {
            Some("sqlite") => Self::Sqlite {
                url: lookup_value(lookup, "DATABASE_URL")
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            },
            other => {
                if let Some(unknown) = other.filter(|v| *v != "json") {
                    warn!(store = unknown, "Unknown NOTIFY_STORE; using the JSON data file");
                }
                Self::Json {
                    path: lookup_value(lookup, "NOTIFY_DATA_FILE")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE)),
                }
            }
        }
    }
}

/// Complete configuration of the notifier process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub store: StoreConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            store: StoreConfig::default(),
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl AppConfig {
    /// Load config from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(&env_lookup)
    }

    /// Supported env vars:
    /// - `NOTIFY_POLL_INTERVAL_MS`
    /// - `NOTIFY_MAX_ATTEMPTS`
    /// - `LOG_DIR`
    /// - plus those of [`StoreConfig`], [`EmailConfig`] and [`SmsConfig`]
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_interval_ms = duration_to_millis(DEFAULT_POLL_INTERVAL);
        let mut poll_interval_ms = parse_or(lookup, "NOTIFY_POLL_INTERVAL_MS", default_interval_ms);
        if poll_interval_ms == 0 {
            warn!("NOTIFY_POLL_INTERVAL_MS must be positive; using default");
            poll_interval_ms = default_interval_ms;
        }

        let mut max_attempts = parse_or(lookup, "NOTIFY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            warn!("NOTIFY_MAX_ATTEMPTS must be positive; using default");
            max_attempts = DEFAULT_MAX_ATTEMPTS;
        }

        Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_attempts,
            store: StoreConfig::from_lookup(lookup),
            email: EmailConfig::from_lookup(lookup),
            sms: SmsConfig::from_lookup(lookup),
            log_dir: lookup_value(lookup, "LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_attempts: self.max_attempts,
        }
    }
}
