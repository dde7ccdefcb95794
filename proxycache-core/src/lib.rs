//! Proxycache - Core
//!
//! A forwarding HTTP proxy that answers repeated GET requests from a bounded
//! in-memory object cache instead of going back to the origin server.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use proxycache_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProxyConfig::load()?;
//!     init_logging(&config.logging)?;
//!     ProxyServer::new(config)?.serve().await
//! }
//! ```
//!
//! # Architecture
//!
//! - [`cache`] - fixed array of slots with per-slot reader/writer admission
//! - [`proxy`] - request parsing, header rewriting and the per-connection relay
//! - [`server`] - accept loop spawning one detached task per connection
//! - [`config`] - layered TOML / environment configuration
//! - [`logging`] - `log` + `env_logger` setup
//!
//! Data flow: server → relay → cache (hit) or header rewriter → origin →
//! relay (streams back) → cache (conditional insert).

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod server;

pub use error::{ProxyError, ProxyResult};

/// Commonly used types
pub mod prelude {
    pub use crate::cache::{CacheStats, ObjectCache};
    pub use crate::config::ProxyConfig;
    pub use crate::error::{ProxyError, ProxyResult};
    pub use crate::logging::init_logging;
    pub use crate::proxy::{OutcomeKind, RelayHandler, RelayOutcome};
    pub use crate::server::ProxyServer;
}
