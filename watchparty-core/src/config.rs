use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub session: SessionLimits,
    pub tasks: TaskConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Default participant cap when a session config does not set one
    pub default_max_participants: usize,
    /// Retained chat messages per session (FIFO eviction beyond this)
    pub chat_history_limit: usize,
    /// Advisory tolerance forwarded with every playback sync
    pub sync_tolerance_ms: u64,
    /// Scheme used to build join URLs (`<scheme>://join/<session_id>`)
    pub join_url_scheme: String,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            default_max_participants: 16,
            chat_history_limit: 1000,
            sync_tolerance_ms: 1000,
            join_url_scheme: "watchparty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Liveness ping cadence per session
    pub heartbeat_interval_secs: u64,
    /// Presence status refresh cadence
    pub presence_interval_secs: u64,
    /// Stale-connection sweep cadence
    pub monitor_interval_secs: u64,
    /// Users idle longer than this are evicted by the monitor
    pub presence_timeout_secs: u64,
    /// Users idle longer than this are marked Away
    pub away_threshold_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            presence_interval_secs: 2,
            monitor_interval_secs: 5,
            presence_timeout_secs: 30,
            away_threshold_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" (production) or "pretty" (development)
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional file, layered under
    /// `WATCHPARTY_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(
                Environment::with_prefix("WATCHPARTY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.session.chat_history_limit, 1000);
        assert_eq!(config.session.sync_tolerance_ms, 1000);
        assert_eq!(config.tasks.heartbeat_interval_secs, 5);
        assert_eq!(config.tasks.presence_interval_secs, 2);
        assert_eq!(config.tasks.monitor_interval_secs, 5);
        assert_eq!(config.tasks.presence_timeout_secs, 30);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = EngineConfig::load(None).expect("load default config");
        assert_eq!(config.session.join_url_scheme, "watchparty");
        assert_eq!(config.logging.level, "info");
    }
}
