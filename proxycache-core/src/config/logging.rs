//! Logging configuration

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug, trace or off
    /// Env: PC_LOG_LEVEL
    /// Default: "info"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(level) = env::var("PC_LOG_LEVEL") {
            self.level = level;
        }
    }

    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        self.level.parse().map_err(|_| anyhow!("Invalid log level: {}", self.level))
    }

    pub fn validate(&self) -> Result<()> {
        self.level_filter().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        let cfg = LoggingConfig { level: "DEBUG".to_string() };
        assert_eq!(cfg.level_filter().unwrap(), log::LevelFilter::Debug);

        let cfg = LoggingConfig { level: "loud".to_string() };
        assert!(cfg.validate().is_err());
    }
}
