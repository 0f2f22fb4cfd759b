//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `convoflow.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use convoflow_app::config::{EngineConfig, QueueConfig};
use convoflow_domain::job::{JobType, RetryPolicy};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Job queue tuning.
    pub queue: QueueSection,
    /// Action executor settings.
    pub engine: EngineSection,
    /// Stored message templates, by id.
    pub templates: HashMap<String, String>,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// `[queue]` section. Periods are in milliseconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub poll_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub max_concurrent: usize,
    /// Per job type (`send_message`, …) dispatch limit.
    pub max_concurrent_overrides: HashMap<String, usize>,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub default_max_attempts: u32,
}

/// `[engine]` section. Periods are in seconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub webhook_timeout_secs: u64,
    pub handoff_tag: String,
    pub serialize_per_contact: bool,
    pub schedule_scan_interval_secs: u64,
    pub schedule_tolerance_secs: u64,
}

impl Config {
    /// Load configuration from `convoflow.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("convoflow.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CONVOFLOW_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("CONVOFLOW_PORT")
            && let Ok(port) = val.parse()
        {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("CONVOFLOW_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("CONVOFLOW_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("CONVOFLOW_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.queue.max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "queue.max_concurrent must be non-zero".to_string(),
            ));
        }
        if self.queue.default_max_attempts == 0 {
            return Err(ConfigError::Validation(
                "queue.default_max_attempts must be non-zero".to_string(),
            ));
        }
        if self.queue.poll_interval_ms == 0 || self.queue.sweep_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "queue periods must be non-zero".to_string(),
            ));
        }
        if self.queue.retry_base_delay_ms > self.queue.retry_max_delay_ms {
            return Err(ConfigError::Validation(
                "queue.retry_base_delay_ms exceeds queue.retry_max_delay_ms".to_string(),
            ));
        }
        if self.engine.schedule_scan_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.schedule_scan_interval_secs must be non-zero".to_string(),
            ));
        }
        for (name, limit) in &self.queue.max_concurrent_overrides {
            JobType::from_str(name)
                .map_err(|_| ConfigError::Validation(format!("unknown job type `{name}`")))?;
            if *limit == 0 {
                return Err(ConfigError::Validation(format!(
                    "queue.max_concurrent_overrides.{name} must be non-zero"
                )));
            }
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// Queue settings. Unknown job type names are skipped; `load` rejects them.
    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        let queue = &self.queue;
        QueueConfig {
            poll_interval: Duration::from_millis(queue.poll_interval_ms),
            sweep_interval: Duration::from_millis(queue.sweep_interval_ms),
            max_concurrent: queue.max_concurrent,
            max_concurrent_overrides: queue
                .max_concurrent_overrides
                .iter()
                .filter_map(|(name, limit)| JobType::from_str(name).ok().map(|t| (t, *limit)))
                .collect(),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(queue.retry_base_delay_ms),
                max_delay: Duration::from_millis(queue.retry_max_delay_ms),
            },
            default_max_attempts: queue.default_max_attempts,
        }
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let engine = &self.engine;
        EngineConfig {
            webhook_timeout: Duration::from_secs(engine.webhook_timeout_secs),
            handoff_tag: engine.handoff_tag.clone(),
            serialize_per_contact: engine.serialize_per_contact,
            schedule_scan_interval: Duration::from_secs(engine.schedule_scan_interval_secs),
            schedule_tolerance: Duration::from_secs(engine.schedule_tolerance_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:convoflow.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "convoflowd=info,convoflow=info,tower_http=debug".to_string(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for QueueSection {
    fn default() -> Self {
        let defaults = QueueConfig::default();
        Self {
            poll_interval_ms: millis(defaults.poll_interval),
            sweep_interval_ms: millis(defaults.sweep_interval),
            max_concurrent: defaults.max_concurrent,
            max_concurrent_overrides: HashMap::new(),
            retry_base_delay_ms: millis(defaults.retry.base_delay),
            retry_max_delay_ms: millis(defaults.retry.max_delay),
            default_max_attempts: defaults.default_max_attempts,
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            webhook_timeout_secs: defaults.webhook_timeout.as_secs(),
            handoff_tag: defaults.handoff_tag,
            serialize_per_contact: defaults.serialize_per_contact,
            schedule_scan_interval_secs: defaults.schedule_scan_interval.as_secs(),
            schedule_tolerance_secs: defaults.schedule_tolerance.as_secs(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
