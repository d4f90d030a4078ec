//! Relay configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (KITE_*)
//! - TOML configuration file

use anyhow::{bail, Context, Result};
use kite_core::RouterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Router limits and links.
    #[serde(default)]
    pub router: RouterSettings,

    /// Event bus configuration.
    #[serde(default)]
    pub events: EventsConfig,

    /// Message history configuration.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Guest messages a host can still reply to.
    #[serde(default = "default_unanswered_capacity")]
    pub unanswered_capacity: usize,

    /// Deliveries per channel awaiting acknowledgement.
    #[serde(default = "default_pending_ack_capacity")]
    pub pending_ack_capacity: usize,

    /// Public chat page announced to new hosts.
    #[serde(default = "default_channel_url")]
    pub channel_url: Option<String>,
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per listener before it lags.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

/// Message history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Record routed messages.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Messages kept per conversation.
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,

    /// Messages resent to a reconnecting member, 0 to disable.
    #[serde(default = "default_replay_limit")]
    pub replay_limit: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_unanswered_capacity() -> usize {
    256
}

fn default_pending_ack_capacity() -> usize {
    1024
}

fn default_channel_url() -> Option<String> {
    std::env::var("KITE_CHANNEL_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

fn default_event_capacity() -> usize {
    1024
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_replay_limit() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    std::env::var("KITE_METRICS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9090)
}

fn default_log_filter() -> String {
    std::env::var("KITE_LOG").unwrap_or_else(|_| "kite=info".to_string())
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            unanswered_capacity: default_unanswered_capacity(),
            pending_ack_capacity: default_pending_ack_capacity(),
            channel_url: default_channel_url(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_history_capacity(),
            replay_limit: default_replay_limit(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from the first file found, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "kite.toml",
            "/etc/kite/kite.toml",
            "~/.config/kite/kite.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Defaults still pick up environment overrides
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check limits that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first zero capacity.
    pub fn validate(&self) -> Result<()> {
        if self.router.unanswered_capacity == 0 {
            bail!("router.unanswered_capacity must be greater than zero");
        }
        if self.router.pending_ack_capacity == 0 {
            bail!("router.pending_ack_capacity must be greater than zero");
        }
        if self.events.capacity == 0 {
            bail!("events.capacity must be greater than zero");
        }
        if self.history.enabled && self.history.capacity == 0 {
            bail!("history.capacity must be greater than zero");
        }
        Ok(())
    }

    /// Router configuration for `kite-core`.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            unanswered_capacity: self.router.unanswered_capacity,
            pending_ack_capacity: self.router.pending_ack_capacity,
            channel_url: self.router.channel_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.router.unanswered_capacity, 256);
        assert_eq!(config.router.pending_ack_capacity, 1024);
        assert_eq!(config.events.capacity, 1024);
        assert!(config.metrics.enabled);
        assert!(config.history.enabled);
        assert_eq!(config.history.capacity, 100);
        assert_eq!(config.history.replay_limit, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [router]
            unanswered_capacity = 64
            channel_url = "https://kite.example/chat"

            [history]
            replay_limit = 0

            [metrics]
            enabled = false
            port = 9100

            [log]
            filter = "kite=debug"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.router.unanswered_capacity, 64);
        assert_eq!(config.router.pending_ack_capacity, 1024);
        assert_eq!(config.metrics.port, 9100);
        assert!(!config.metrics.enabled);
        assert_eq!(config.log.filter, "kite=debug");
        assert!(config.history.enabled);
        assert_eq!(config.history.replay_limit, 0);

        let router = config.router_config();
        assert_eq!(router.unanswered_capacity, 64);
        assert_eq!(
            router.channel_url.as_deref(),
            Some("https://kite.example/chat")
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config: Config = toml::from_str("[events]\ncapacity = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("events.capacity"));
    }

    #[test]
    fn test_from_file_reports_path() {
        let path = std::env::temp_dir().join(format!("kite-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[router]\nunanswered_capacity = \"many\"").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/kite.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
