//! Connection dispatcher
//!
//! Accepts connections and hands each one to the shared [`RelayHandler`] on its
//! own tokio task. Tasks are detached: nothing joins or cancels them, and there
//! is no cap on how many run at once.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::cache::ObjectCache;
use crate::config::ProxyConfig;
use crate::proxy::RelayHandler;

/// Forwarding proxy bound to one listening port
pub struct ProxyServer {
    config: ProxyConfig,
    handler: Arc<RelayHandler>,
}

impl ProxyServer {
    /// Validate `config` and build the cache; the cache lives as long as the server
    pub fn new(config: ProxyConfig) -> Result<Self> {
        config.validate().context("Invalid proxy configuration")?;

        let cache = config.cache.enabled.then(|| Arc::new(ObjectCache::from_config(&config.cache)));
        let handler = Arc::new(RelayHandler::new(cache, &config.relay));

        Ok(Self { config, handler })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Shared cache, if caching is enabled
    pub fn cache(&self) -> Option<Arc<ObjectCache>> {
        self.handler.cache().cloned()
    }

    /// Bind the configured address and serve forever
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.server.bind_address();
        let listener =
            TcpListener::bind(&addr).await.with_context(|| format!("Failed to bind to {}", addr))?;
        self.serve_on(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Listener has no local address")?;

        log::info!("🚀 Proxy listening on {}", local);
        match self.handler.cache() {
            Some(cache) => log::info!(
                "   Cache: {} slots, {} bytes per object",
                cache.capacity(),
                cache.max_object_size()
            ),
            None => log::info!("   Cache: disabled"),
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) => log::error!("❌ Failed to accept connection: {}", e),
            }
        }
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let handler = Arc::clone(&self.handler);

        // Detached: the JoinHandle is dropped on purpose
        tokio::spawn(async move {
            match handler.handle(stream).await {
                Ok(outcome) => log::info!(
                    "{} \"{} {}\" {} {}B {}ms",
                    peer,
                    outcome.method,
                    outcome.target,
                    outcome.kind,
                    outcome.bytes_sent,
                    outcome.elapsed.as_millis()
                ),
                Err(e) => log::warn!("{} connection aborted: {}", peer, e),
            }
        });
    }
}
