#![allow(dead_code)]
//! Test harness: an in-process proxy and scripted origin servers on loopback

use proxycache_core::cache::ObjectCache;
use proxycache_core::config::ProxyConfig;
use proxycache_core::server::ProxyServer;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Proxy running on an ephemeral port
pub struct TestProxy {
    pub addr: SocketAddr,
    pub cache: Option<Arc<ObjectCache>>,
    task: JoinHandle<()>,
}

impl TestProxy {
    pub async fn start(config: ProxyConfig) -> Self {
        let server = ProxyServer::new(config).expect("valid config");
        let cache = server.cache();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let _ = server.serve_on(listener).await;
        });

        Self { addr, cache, task }
    }

    pub async fn with_slots(slots: usize, max_object_size: usize) -> Self {
        let mut config = ProxyConfig::default();
        config.cache.slots = slots;
        config.cache.max_object_size = max_object_size;
        Self::start(config).await
    }

    pub fn cache(&self) -> &ObjectCache {
        self.cache.as_deref().expect("cache enabled")
    }

    /// Send raw request bytes and read until the proxy closes the connection
    pub async fn send(&self, request: &str) -> Vec<u8> {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
            .await
            .expect("proxy answered in time")
            .unwrap();
        response
    }

    pub async fn get(&self, target: &str) -> Vec<u8> {
        self.send(&format!("GET {} HTTP/1.0\r\n\r\n", target)).await
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Origin serving fixed bodies by path and counting the connections it gets
pub struct TestOrigin {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestOrigin {
    pub async fn start(routes: HashMap<String, Vec<u8>>) -> Self {
        Self::start_with_delay(routes, Duration::ZERO).await
    }

    /// Like `start`, but pauses `delay` between every line of each response
    pub async fn start_with_delay(routes: HashMap<String, Vec<u8>>, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let routes = Arc::new(routes);

        let task = {
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let routes = Arc::clone(&routes);
                    tokio::spawn(serve_one(stream, routes, delay));
                }
            })
        };

        Self { port, connections, task }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Stop accepting; later connections to this port are refused
    pub async fn shutdown(mut self) {
        self.task.abort();
        // Resolves once the accept loop, and with it the listener, is dropped
        let _ = (&mut self.task).await;
    }
}

impl Drop for TestOrigin {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Full HTTP/1.0 response with a text body
pub fn response_with_body(body: &[u8]) -> Vec<u8> {
    let mut response =
        format!("HTTP/1.0 200 OK\r\nContent-type: text/plain\r\nContent-length: {}\r\n\r\n", body.len())
            .into_bytes();
    response.extend_from_slice(body);
    response
}

async fn serve_one(stream: TcpStream, routes: Arc<HashMap<String, Vec<u8>>>, delay: Duration) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 || line == "\r\n" {
            break;
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
    let response = match routes.get(&path) {
        Some(response) => response.clone(),
        None => b"HTTP/1.0 404 Not Found\r\nContent-length: 0\r\n\r\n".to_vec(),
    };

    if delay.is_zero() {
        let _ = write_half.write_all(&response).await;
        return;
    }
    for chunk in response.split_inclusive(|&b| b == b'\n') {
        if write_half.write_all(chunk).await.is_err() {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}
