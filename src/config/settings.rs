//! Application settings loading from config.toml
//!
//! Non-secret settings live in a TOML file. Every section has defaults so a missing
//! key (or an empty file) still yields a working configuration. Secrets such as bot
//! tokens are read from the environment by the binary, never from this file.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Telegram chat targets and message templates
    pub telegram: TelegramSettings,
    /// Background execution, timeouts and retry policy
    pub delivery: DeliverySettings,
    /// Rendered invoice storage
    pub invoices: InvoiceSettings,
    /// Smart alert thresholds
    pub alerts: AlertSettings,
}

/// `[telegram]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    /// Bot API base URL
    pub api_base: String,
    /// Group chat that receives bulk album sends
    pub group_chat_id: Option<String>,
    /// Landlord chat that receives smart alerts
    pub admin_chat_id: Option<String>,
    /// Template for test pings; `{room_number}`, `{month}` and `{bill_id}` are substituted
    pub test_message_template: String,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            group_chat_id: None,
            admin_chat_id: None,
            test_message_template: "Test message for room {room_number}.".to_string(),
        }
    }
}

/// `[delivery]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Run generate/issue/send jobs on background workers (false = inline)
    pub async_tasks: bool,
    /// Maximum number of jobs running at once
    pub worker_count: usize,
    /// Timeout for a single notifier or renderer call
    pub request_timeout_secs: u64,
    /// Timeout for an album upload
    pub album_timeout_secs: u64,
    /// Attempts per network call, including the first one
    pub max_attempts: u32,
    /// Linear backoff step; attempt n waits n * `backoff_ms`
    pub backoff_ms: u64,
    /// Invoices per album in group sends
    pub album_size: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            async_tasks: true,
            worker_count: 4,
            request_timeout_secs: 15,
            album_timeout_secs: 30,
            max_attempts: 3,
            backoff_ms: 1500,
            album_size: 10,
        }
    }
}

impl DeliverySettings {
    /// Per-call timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Album upload timeout as a `Duration`.
    #[must_use]
    pub const fn album_timeout(&self) -> Duration {
        Duration::from_secs(self.album_timeout_secs)
    }
}

/// `[invoices]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvoiceSettings {
    /// Root directory for rendered invoices
    pub output_dir: PathBuf,
    /// Language used for deliveries and bulk generation (`kh`, `en`, `fr`)
    pub default_language: String,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/invoices"),
            default_language: "kh".to_string(),
        }
    }
}

/// `[alerts]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Days after the latest send before unpaid bills are flagged
    pub due_days: i64,
    /// Usage above the recent average by more than this percentage is a spike
    pub usage_spike_pct: u32,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            due_days: 5,
            usage_spike_pct: 30,
        }
    }
}

impl Settings {
    fn validate(self) -> Result<Self> {
        if self.delivery.worker_count == 0 {
            return Err(Error::Config {
                message: "delivery.worker_count must be at least 1".to_string(),
            });
        }
        if self.delivery.max_attempts == 0 {
            return Err(Error::Config {
                message: "delivery.max_attempts must be at least 1".to_string(),
            });
        }
        if self.delivery.album_size == 0 || self.delivery.album_size > 10 {
            return Err(Error::Config {
                message: "delivery.album_size must be between 1 and 10".to_string(),
            });
        }
        Ok(self)
    }
}

/// Parses settings from a TOML string.
///
/// # Errors
/// Returns an error if the TOML syntax is invalid or a value is out of range.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    settings.validate()
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A value is out of range
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_settings(&contents)
}

/// Loads settings from `./config.toml`, falling back to defaults when the file is absent.
pub fn load_default_settings() -> Result<Settings> {
    let path = Path::new("config.toml");
    if path.exists() {
        load_settings(path)
    } else {
        tracing::warn!("config.toml not found, using default settings");
        Settings::default().validate()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_full_settings() {
        let toml_str = r#"
            [telegram]
            group_chat_id = "-100123"
            admin_chat_id = "42"

            [delivery]
            async_tasks = false
            worker_count = 2
            max_attempts = 2
            backoff_ms = 10

            [invoices]
            output_dir = "/tmp/invoices"
            default_language = "en"

            [alerts]
            due_days = 7
        "#;

        let settings = parse_settings(toml_str).unwrap();
        assert_eq!(settings.telegram.group_chat_id.as_deref(), Some("-100123"));
        assert_eq!(settings.telegram.admin_chat_id.as_deref(), Some("42"));
        assert!(!settings.delivery.async_tasks);
        assert_eq!(settings.delivery.worker_count, 2);
        assert_eq!(settings.delivery.max_attempts, 2);
        assert_eq!(settings.delivery.backoff_ms, 10);
        // untouched keys keep their defaults
        assert_eq!(settings.delivery.request_timeout_secs, 15);
        assert_eq!(settings.delivery.album_size, 10);
        assert_eq!(settings.invoices.default_language, "en");
        assert_eq!(settings.alerts.due_days, 7);
        assert_eq!(settings.alerts.usage_spike_pct, 30);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = parse_settings("").unwrap();
        assert!(settings.delivery.async_tasks);
        assert_eq!(settings.delivery.max_attempts, 3);
        assert_eq!(settings.telegram.api_base, "https://api.telegram.org");
        assert!(settings.telegram.group_chat_id.is_none());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let result = parse_settings("[delivery]\nworker_count = 0\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_oversized_album() {
        let result = parse_settings("[delivery]\nalbum_size = 11\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_invalid_toml() {
        let result = parse_settings("[delivery\nworker_count = 1");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
