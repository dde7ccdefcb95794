//! Server configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening address
    /// Env: PC_HOST
    /// Default: "0.0.0.0"
    pub host: String,

    /// Listening port
    /// Env: PC_PORT
    /// Default: 8080
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl ServerConfig {
    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        self.host = other.host;
        self.port = other.port;
    }

    /// Apply environment variables
    pub fn apply_env_vars(&mut self) {
        if let Ok(host) = env::var("PC_HOST") {
            self.host = host;
        }

        if let Ok(port) = env::var("PC_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }
    }

    /// `host:port` for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("Invalid host: must not be empty");
        }
        Ok(())
    }
}
