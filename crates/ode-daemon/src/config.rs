//! Configuration for oded

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ode_feed::FeedConfig;
use ode_ledger::{LedgerConfig, SyncMode};
use ode_runner::RunnerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Ledger store configuration
    #[serde(default)]
    pub ledger: LedgerSettings,

    /// Autonomous runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Which producer the runner drives
    #[serde(default)]
    pub producer: ProducerSettings,

    /// Live feed configuration
    #[serde(default)]
    pub feed: FeedSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Start the autonomous runner alongside the API
    #[serde(default = "default_true")]
    pub run_runner: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            enable_cors: true,
            run_runner: true,
        }
    }
}

/// Ledger store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// JSONL file backing the ledger
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,

    /// Sync behaviour after each append
    #[serde(default)]
    pub sync: SyncMode,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            sync: SyncMode::Immediate,
        }
    }
}

impl LedgerSettings {
    pub fn to_ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            path: self.path.clone(),
            sync_mode: self.sync,
        }
    }
}

/// Producer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerKind {
    /// Canned observation, no network access
    #[default]
    Simulated,
    /// Fetch `url` over HTTP
    Web,
}

/// Producer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerSettings {
    #[serde(default)]
    pub kind: ProducerKind,

    /// Topic the observer reports on
    #[serde(default = "default_query")]
    pub query: String,

    /// Page fetched by the web producer
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            kind: ProducerKind::Simulated,
            query: default_query(),
            url: None,
        }
    }
}

/// Live feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Ledger poll period in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Per-connection buffer of undelivered messages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Poll immediately after in-process appends
    #[serde(default = "default_true")]
    pub push_on_append: bool,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            channel_capacity: default_channel_capacity(),
            push_on_append: true,
        }
    }
}

impl FeedSettings {
    pub fn to_feed_config(&self) -> FeedConfig {
        FeedConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            channel_capacity: self.channel_capacity,
            push_on_append: self.push_on_append,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("ledger/entries.jsonl")
}

fn default_query() -> String {
    ode_runner::observer::DEFAULT_QUERY.to_string()
}

fn default_poll_interval() -> u64 {
    5_000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then an optional file, then `ODE_`
    /// environment variables (`ODE_RUNNER__MAX_ACTIONS_PER_DAY=5`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ODE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> DaemonResult<()> {
        self.runner
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;

        if self.feed.poll_interval_ms == 0 {
            return Err(DaemonError::Config(
                "feed.poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.feed.channel_capacity == 0 {
            return Err(DaemonError::Config(
                "feed.channel_capacity must be at least 1".into(),
            ));
        }
        if self.producer.kind == ProducerKind::Web && self.producer.url.is_none() {
            return Err(DaemonError::Config(
                "producer.url is required for the web producer".into(),
            ));
        }
        if self.ledger.path.as_os_str().is_empty() {
            return Err(DaemonError::Config("ledger.path must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8000);
        assert!(config.server.run_runner);
        assert_eq!(config.ledger.path, PathBuf::from("ledger/entries.jsonl"));
        assert_eq!(config.ledger.sync, SyncMode::Immediate);
        assert_eq!(config.runner.max_actions_per_day, 3);
        assert_eq!(config.runner.observation_interval_secs, 8 * 3600);
        assert_eq!(config.producer.kind, ProducerKind::Simulated);
        config.validate().unwrap();
    }

    #[test]
    fn test_feed_defaults() {
        let feed = FeedSettings::default().to_feed_config();
        assert_eq!(feed.poll_interval, Duration::from_secs(5));
        assert_eq!(feed.channel_capacity, 256);
        assert!(feed.push_on_append);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.runner.agent_id, "obs_auto");
        assert_eq!(config.feed.poll_interval_ms, 5_000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oded.toml");
        std::fs::write(
            &path,
            r#"
[server]
listen_addr = "0.0.0.0:9100"

[ledger]
path = "/var/lib/ode/entries.jsonl"
sync = "os_managed"

[runner]
max_actions_per_day = 5
observation_interval_secs = 600

[producer]
kind = "web"
url = "https://example.com/"
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str()).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9100);
        assert_eq!(config.ledger.sync, SyncMode::OsManaged);
        assert_eq!(config.runner.max_actions_per_day, 5);
        assert_eq!(config.runner.observation_interval_secs, 600);
        assert_eq!(config.runner.agent_id, "obs_auto");
        assert_eq!(config.producer.kind, ProducerKind::Web);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_zero_quota() {
        let mut config = DaemonConfig::default();
        config.runner.max_actions_per_day = 0;
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_validation_requires_url_for_web_producer() {
        let mut config = DaemonConfig::default();
        config.producer.kind = ProducerKind::Web;
        assert!(config.validate().is_err());
        config.producer.url = Some("https://example.com/".into());
        assert!(config.validate().is_ok());
    }
}
