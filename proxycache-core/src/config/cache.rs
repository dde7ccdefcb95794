//! Object cache configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve repeated requests from memory
    /// Env: PC_CACHE_ENABLED
    /// Default: true
    pub enabled: bool,

    /// Number of slots (objects held at once)
    /// Env: PC_CACHE_SLOTS
    /// Default: 10
    pub slots: usize,

    /// Largest response that will be cached, in bytes
    /// Env: PC_MAX_OBJECT_SIZE
    /// Default: 102400
    pub max_object_size: usize,

    /// Upper bound for slots * max_object_size
    /// Env: PC_MAX_CACHE_SIZE
    /// Default: 1049000
    pub max_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, slots: 10, max_object_size: 102_400, max_cache_size: 1_049_000 }
    }
}

impl CacheConfig {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        if let Ok(enabled) = env::var("PC_CACHE_ENABLED") {
            self.enabled = enabled.parse().unwrap_or(true);
        }
        if let Ok(slots) = env::var("PC_CACHE_SLOTS") {
            if let Ok(n) = slots.parse() {
                self.slots = n;
            }
        }
        if let Ok(size) = env::var("PC_MAX_OBJECT_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_object_size = n;
            }
        }
        if let Ok(size) = env::var("PC_MAX_CACHE_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_cache_size = n;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            bail!("Invalid cache slots: must be greater than 0");
        }
        if self.max_object_size == 0 {
            bail!("Invalid max_object_size: must be greater than 0");
        }
        match self.slots.checked_mul(self.max_object_size) {
            Some(total) if total <= self.max_cache_size => Ok(()),
            _ => bail!(
                "Cache too large: {} slots of {} bytes exceed max_cache_size {}",
                self.slots,
                self.max_object_size,
                self.max_cache_size
            ),
        }
    }
}
