//! Configuration system for proxycache
//!
//! # Configuration Hierarchy
//!
//! Configuration values are resolved in the following order (highest priority wins):
//!
//! 1. **Command line** - applied by the binary after loading
//! 2. **Environment Variables** (`PC_*`) - Override file config
//! 3. **Config File** (proxycache.toml) - Override defaults
//! 4. **Defaults** - Lowest priority
//!
//! # Example
//!
//! ```no_run
//! use proxycache_core::config::ProxyConfig;
//!
//! let config = ProxyConfig::load_from("proxycache.toml")?;
//! config.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cache;
pub mod logging;
pub mod relay;
pub mod server;

pub use cache::CacheConfig;
pub use logging::LoggingConfig;
pub use relay::RelayConfig;
pub use server::ServerConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

impl ProxyConfig {
    /// Load configuration with full supersedence chain from `proxycache.toml`
    pub fn load() -> Result<Self> {
        Self::load_from("proxycache.toml")
    }

    /// Defaults, then the file at `path` if it exists, then environment variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = Self::default();

        if path.exists() {
            let file_config = Self::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.merge(file_config);
        }

        config.apply_env_vars();

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.as_ref().display()))
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        self.server.merge(other.server);
        self.cache.merge(other.cache);
        self.relay.merge(other.relay);
        self.logging.merge(other.logging);
    }

    pub fn apply_env_vars(&mut self) {
        self.server.apply_env_vars();
        self.cache.apply_env_vars();
        self.relay.apply_env_vars();
        self.logging.apply_env_vars();
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.cache.validate()?;
        self.relay.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
