//! Engine configuration.
//!
//! # Responsibility
//! - Describe tunables for id generation, broadcast fan-out and logging.
//! - Load them from JSON with defaults for every omitted field.
//!
//! # Invariants
//! - A config returned by `validate`/`from_json_str`/`load` is usable as-is:
//!   budgets, id space and queue sizes are non-zero.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Largest integer that survives a round trip through a JSON number.
pub const DEFAULT_PROBE_ID_SPACE: i64 = 1 << 53;
pub const DEFAULT_PROBE_RETRY_BUDGET: u32 = 16;
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 256;
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Surrogate id strategy used for rows created by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// `MAX(id) + 1` inside the reconciliation transaction.
    #[default]
    Sequence,
    /// Random candidate, existence check, bounded retry.
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Exclusive upper bound of drawn ids; ids start at 1.
    pub id_space: i64,
    pub retry_budget: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            id_space: DEFAULT_PROBE_ID_SPACE,
            retry_budget: DEFAULT_PROBE_RETRY_BUDGET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub max_subscribers: usize,
    /// Bounded queue per subscriber; a full queue drops that subscriber.
    pub queue_depth: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files. `None` keeps logging off.
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub id_strategy: IdStrategy,
    pub probe: ProbeConfig,
    pub broadcast: BroadcastConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Parses a JSON document; omitted fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.id_space < 2 {
            return Err(ConfigError::Invalid(format!(
                "probe.id_space must be >= 2, got {}",
                self.probe.id_space
            )));
        }
        if self.probe.retry_budget == 0 {
            return Err(ConfigError::Invalid(
                "probe.retry_budget must be > 0".to_string(),
            ));
        }
        if self.broadcast.max_subscribers == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.max_subscribers must be > 0".to_string(),
            ));
        }
        if self.broadcast.queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "broadcast.queue_depth must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, IdStrategy, DEFAULT_PROBE_ID_SPACE};

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("defaults should parse");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.id_strategy, IdStrategy::Sequence);
        assert_eq!(config.probe.id_space, DEFAULT_PROBE_ID_SPACE);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "id_strategy": "probe", "probe": { "retry_budget": 3 } }"#,
        )
        .expect("partial config should parse");
        assert_eq!(config.id_strategy, IdStrategy::Probe);
        assert_eq!(config.probe.retry_budget, 3);
        assert_eq!(config.probe.id_space, DEFAULT_PROBE_ID_SPACE);
    }

    #[test]
    fn zero_queue_depth_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "broadcast": { "queue_depth": 0 } }"#)
            .expect_err("zero queue depth must fail");
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("queue_depth")));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "broadcast": { "max_subscribers": 4 } }"#).expect("write");

        let config = EngineConfig::load(&path).expect("load should succeed");
        assert_eq!(config.broadcast.max_subscribers, 4);
    }
}
