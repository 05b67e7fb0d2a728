use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub saver: SaverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_brokers")]
    pub brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Number of undelivered messages buffered between the Kafka stream and
    /// the frame cache. Older messages are dropped first.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaverConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            group_id: default_group_id(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            directory: default_directory(),
        }
    }
}

impl SaverConfig {
    /// Save interval as a `Duration`.
    ///
    /// Fails for values that are not positive, do not fit in a `Duration`, or
    /// round down to zero.
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        let secs = self.interval_secs;
        match Duration::try_from_secs_f64(secs) {
            Ok(interval) if !interval.is_zero() => Ok(interval),
            _ => Err(ConfigError::Invalid(format!(
                "saver.interval_secs must be a positive number of seconds, got {secs}"
            ))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.saver.interval()?;
        if self.kafka.queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "kafka.queue_depth must be at least 1".into(),
            ));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("kafka.topic must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_brokers() -> String {
    "localhost:9092".into()
}
fn default_topic() -> String {
    "camera.ir.image_raw".into()
}
fn default_group_id() -> String {
    "ir-image-saver".into()
}
fn default_queue_depth() -> usize {
    10
}
fn default_interval_secs() -> f64 {
    5.0
}
fn default_directory() -> PathBuf {
    PathBuf::from("ir_images")
}
fn default_log_level() -> String {
    "info".into()
}
