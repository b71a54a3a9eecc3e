//! Configuration loading for sync-client.
//!
//! Configuration is loaded from a TOML file. Every section and field is
//! optional; missing values fall back to the defaults below.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tictactoe_sync_core::RetryPolicy;
use tictactoe_sync_types::{BroadcastMove, RoomId};

/// Upper bound for any retry delay setting (10 minutes).
const MAX_RETRY_DELAY_MS: u64 = 600_000;

/// Upper bound for the retry jitter setting (1 minute).
const MAX_RETRY_JITTER_MS: u64 = 60_000;

/// Root configuration for a game client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Subscription retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Fast-path broadcast configuration.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// Game bookkeeping configuration.
    #[serde(default)]
    pub game: GameConfig,
}

/// Subscription retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry (default: 3000).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay before the second retry (default: 5000).
    #[serde(default = "default_second_delay_ms")]
    pub second_delay_ms: u64,
    /// Cap on the base delay (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Cap on the random jitter added to each delay (default: 500).
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    /// Consecutive failures before giving up (default: 8).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Fast-path broadcast configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Publish and subscribe to move broadcasts (default: true).
    #[serde(default = "default_broadcast_enabled")]
    pub enabled: bool,
    /// Event name on the room topic (default: "move").
    #[serde(default = "default_broadcast_event")]
    pub event: String,
    /// Prefix for per-room topics (default: "room:").
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

/// Game bookkeeping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameConfig {
    /// Insert a history record when a game ends (default: true).
    #[serde(default = "default_record_history")]
    pub record_history: bool,
}

// Default value functions
fn default_initial_delay_ms() -> u64 {
    3000
}

fn default_second_delay_ms() -> u64 {
    5000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_jitter_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    8
}

fn default_broadcast_enabled() -> bool {
    true
}

fn default_broadcast_event() -> String {
    BroadcastMove::EVENT.to_string()
}

fn default_topic_prefix() -> String {
    "room:".to_string()
}

fn default_record_history() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            second_delay_ms: default_second_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: default_broadcast_enabled(),
            event: default_broadcast_event(),
            topic_prefix: default_topic_prefix(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            record_history: default_record_history(),
        }
    }
}

impl RetryConfig {
    /// Convert to the core backoff policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            second_delay: Duration::from_millis(self.second_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
            max_attempts: self.max_attempts,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the retry or broadcast contract.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.initial_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.initial_delay_ms must be greater than 0".into(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.max_delay_ms must not be below retry.initial_delay_ms".into(),
            ));
        }
        let delays = [
            ("retry.initial_delay_ms", self.retry.initial_delay_ms),
            ("retry.second_delay_ms", self.retry.second_delay_ms),
            ("retry.max_delay_ms", self.retry.max_delay_ms),
        ];
        for (key, value) in delays {
            if value > MAX_RETRY_DELAY_MS {
                return Err(ConfigError::Invalid(format!(
                    "{} must not exceed {}",
                    key, MAX_RETRY_DELAY_MS
                )));
            }
        }
        if self.retry.max_jitter_ms > MAX_RETRY_JITTER_MS {
            return Err(ConfigError::Invalid(format!(
                "retry.max_jitter_ms must not exceed {}",
                MAX_RETRY_JITTER_MS
            )));
        }
        if self.broadcast.event.trim().is_empty() {
            return Err(ConfigError::Invalid("broadcast.event must not be empty".into()));
        }
        Ok(())
    }

    /// Replace the retry section.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Disable the fast-path broadcast.
    pub fn without_broadcast(mut self) -> Self {
        self.broadcast.enabled = false;
        self
    }

    /// Disable history records.
    pub fn without_history(mut self) -> Self {
        self.game.record_history = false;
        self
    }

    /// Broadcast topic for a room.
    pub fn topic_for(&self, room_id: RoomId) -> String {
        room_id.topic(&self.broadcast.topic_prefix)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.initial_delay_ms, 3000);
        assert_eq!(config.retry.second_delay_ms, 5000);
        assert_eq!(config.broadcast.event, "move");
        assert!(config.game.record_history);
    }

    #[test]
    fn default_policy_matches_core_default() {
        assert_eq!(ClientConfig::default().retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[retry]
initial_delay_ms = 1000
max_attempts = 3

[broadcast]
enabled = false
topic_prefix = "game-"

[game]
record_history = false
"#;

        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.retry.second_delay_ms, 5000);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.broadcast.enabled);
        assert_eq!(config.broadcast.event, "move");
        assert_eq!(config.broadcast.topic_prefix, "game-");
        assert!(!config.game.record_history);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn zero_attempts_rejected() {
        let config = ClientConfig::default().with_retry(RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn immediate_retry_rejected() {
        let config = ClientConfig::default().with_retry(RetryConfig {
            initial_delay_ms: 0,
            ..RetryConfig::default()
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn oversized_delays_rejected() {
        let jitter = ClientConfig::default().with_retry(RetryConfig {
            max_jitter_ms: u64::MAX,
            ..RetryConfig::default()
        });
        assert!(matches!(jitter.validate(), Err(ConfigError::Invalid(_))));

        let delay = ClientConfig::default().with_retry(RetryConfig {
            max_delay_ms: u64::MAX,
            ..RetryConfig::default()
        });
        assert!(matches!(delay.validate(), Err(ConfigError::Invalid(_))));

        let at_cap = ClientConfig::default().with_retry(RetryConfig {
            max_jitter_ms: MAX_RETRY_JITTER_MS,
            max_delay_ms: MAX_RETRY_DELAY_MS,
            ..RetryConfig::default()
        });
        assert!(at_cap.validate().is_ok());
    }

    #[test]
    fn topic_uses_prefix() {
        let config = ClientConfig::default();
        let room = RoomId::new();
        assert_eq!(config.topic_for(room), format!("room:{}", room));
    }

    #[test]
    fn from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retry]\nmax_jitter_ms = 0").unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.retry.max_jitter_ms, 0);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[retry]\nmax_attempts = 0").unwrap();
        assert!(matches!(
            ClientConfig::from_file(bad.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retry\nbroken").unwrap();
        assert!(matches!(
            ClientConfig::from_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn missing_file_reports_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            ClientConfig::from_file(&path),
            Err(ConfigError::ReadError { .. })
        ));
    }
}
