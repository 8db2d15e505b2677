use std::path::Path;
use thiserror::Error;

use super::types::StrataConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StrataConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<StrataConfig, ConfigError> {
    let config: StrataConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Load the default embedded configuration
pub fn load_default_config() -> Result<StrataConfig, ConfigError> {
    let default_config = include_str!("strata_config.json");
    load_config_from_str(default_config)
}

impl StrataConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("no symbols configured".to_string()));
        }
        if let Some(empty) = self.symbols.iter().position(|s| s.is_empty()) {
            return Err(ConfigError::Invalid(format!("symbol #{} is empty", empty)));
        }
        if self.assets.iter().any(|a| a.is_empty()) {
            return Err(ConfigError::Invalid("empty asset code".to_string()));
        }
        if self.cache.queue_capacity == 0 || self.cache.command_buffer_size == 0 {
            return Err(ConfigError::Invalid("cache capacities must be positive".to_string()));
        }
        if self.cache.retention.max_klines == 0 || self.cache.retention.max_trades == 0 {
            return Err(ConfigError::Invalid(
                "retention must keep at least one bar and one trade".to_string(),
            ));
        }
        if self.cache.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid("poll_timeout_ms must be positive".to_string()));
        }
        if self.feed.tick_interval_ms == 0 || self.feed.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "feed tick interval and channel capacity must be positive".to_string(),
            ));
        }
        for p in [
            self.feed.account_event_probability,
            self.feed.error_frame_probability,
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("probability {} out of range", p)));
            }
        }
        Ok(())
    }
}
