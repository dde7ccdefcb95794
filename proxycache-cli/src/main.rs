//! Proxycache CLI - starts the caching forward proxy.
//!
//! ```bash
//! proxycache 15213
//! proxycache 15213 --config proxycache.toml --slots 4 --log-level debug
//! ```
//!
//! See `proxycache --help` for all available options.

use clap::Parser;
use proxycache_core::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "proxycache", about = "Forwarding HTTP proxy with an in-memory object cache", version)]
struct Cli {
    /// Port to listen on
    port: u16,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// TOML configuration file
    #[arg(long, default_value = "proxycache.toml")]
    config: PathBuf,

    /// Number of cache slots
    #[arg(long)]
    slots: Option<usize>,

    /// Largest response cached, in bytes
    #[arg(long)]
    max_object_size: Option<usize>,

    /// Relay every request to the origin
    #[arg(long)]
    no_cache: bool,

    /// error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Command-line values take priority over file and environment
    fn apply(self, config: &mut ProxyConfig) {
        config.server.port = self.port;
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(slots) = self.slots {
            config.cache.slots = slots;
        }
        if let Some(size) = self.max_object_size {
            config.cache.max_object_size = size;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();

    let mut config = ProxyConfig::load_from(&config_path)?;
    cli.apply(&mut config);

    init_logging(&config.logging)?;
    if config_path.exists() {
        log::info!("📄 Loaded configuration from {}", config_path.display());
    }

    ProxyServer::new(config)?.serve().await
}
