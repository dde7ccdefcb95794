//! Relay configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

use crate::proxy::headers::DEFAULT_USER_AGENT;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Longest line read in one piece from client or origin
    /// Env: PC_MAX_LINE
    /// Default: 8192
    pub max_line_length: usize,

    /// User-Agent sent to origins
    /// Env: PC_USER_AGENT
    pub user_agent: String,

    /// Answer rejected requests and unreachable origins with an HTTP error page
    /// instead of closing silently
    /// Env: PC_ERROR_RESPONSES
    /// Default: true
    pub error_responses: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_line_length: 8192,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            error_responses: true,
        }
    }
}

impl RelayConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(max) = env::var("PC_MAX_LINE") {
            if let Ok(n) = max.parse() {
                self.max_line_length = n;
            }
        }
        if let Ok(agent) = env::var("PC_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Ok(enabled) = env::var("PC_ERROR_RESPONSES") {
            self.error_responses = enabled.parse().unwrap_or(true);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_line_length < 16 {
            bail!("Invalid max_line_length: must be at least 16");
        }
        if self.user_agent.contains(['\r', '\n']) {
            bail!("Invalid user_agent: must not contain line breaks");
        }
        Ok(())
    }
}
