//! Per-connection relay
//!
//! One call to [`RelayHandler::handle`] serves one client connection:
//!
//! ```text
//! read request -> method check -> cache lookup --hit--> write cached object
//!                                      |
//!                                     miss
//!                                      v
//!            parse target -> rewrite headers -> connect origin
//!                 -> stream response to client (accumulating a copy)
//!                 -> cache the copy if it never outgrew the object limit
//! ```
//!
//! The connection is closed when `handle` returns, whatever the outcome.

use bytes::Bytes;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::headers::HeaderRewriter;
use super::io::{ends_line, head_section, is_blank_line, read_line};
use super::request::{InboundRequest, Method};
use super::target::UpstreamTarget;
use crate::cache::ObjectCache;
use crate::config::RelayConfig;
use crate::error::{ProxyError, ProxyResult};

/// How a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Served entirely from the cache; no origin contact
    CacheHit,
    /// Forwarded to the origin; `cached` tells whether the response was stored
    Relayed { cached: bool },
    /// Refused before anything was forwarded
    Rejected(StatusCode),
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheHit => f.write_str("HIT"),
            Self::Relayed { cached: true } => f.write_str("MISS stored"),
            Self::Relayed { cached: false } => f.write_str("MISS"),
            Self::Rejected(status) => write!(f, "REJECTED {}", status.as_u16()),
        }
    }
}

/// Summary of one handled connection, used for the access log
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub method: String,
    pub target: String,
    pub kind: OutcomeKind,
    /// Bytes written to the client
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// Request relay shared by every connection task
#[derive(Debug)]
pub struct RelayHandler {
    cache: Option<Arc<ObjectCache>>,
    rewriter: HeaderRewriter,
    max_line: usize,
    error_responses: bool,
}

impl RelayHandler {
    /// `cache` of `None` relays every request straight to the origin
    pub fn new(cache: Option<Arc<ObjectCache>>, config: &RelayConfig) -> Self {
        Self {
            cache,
            rewriter: HeaderRewriter::new(config.user_agent.clone()),
            max_line: config.max_line_length,
            error_responses: config.error_responses,
        }
    }

    pub fn cache(&self) -> Option<&Arc<ObjectCache>> {
        self.cache.as_ref()
    }

    /// Serve one client connection to completion
    ///
    /// Rejections (unsupported method, malformed request, unreachable origin)
    /// come back as `Ok` with [`OutcomeKind::Rejected`] after the error page,
    /// if enabled, was written. I/O failures once relaying has started are
    /// returned as errors; nothing is cached in that case.
    pub async fn handle<S>(&self, client: S) -> ProxyResult<RelayOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let (read_half, mut writer) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);
        let mut outcome = RelayOutcome {
            method: String::new(),
            target: String::new(),
            kind: OutcomeKind::Rejected(StatusCode::BAD_REQUEST),
            bytes_sent: 0,
            elapsed: Duration::ZERO,
        };

        let kind = match self.relay(&mut reader, &mut writer, &mut outcome).await {
            Ok(kind) => kind,
            Err(err) if err.is_reportable() => {
                log::warn!("rejecting {} {}: {}", outcome.method, outcome.target, err);
                if self.error_responses {
                    let response = err.to_response();
                    writer.write_all(&response).await?;
                    outcome.bytes_sent += response.len() as u64;
                }
                OutcomeKind::Rejected(err.status())
            }
            Err(err) => return Err(err),
        };

        writer.flush().await?;
        // The client may already be gone; the connection is finished either way
        let _ = writer.shutdown().await;

        outcome.kind = kind;
        outcome.elapsed = started.elapsed();
        Ok(outcome)
    }

    async fn relay<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        outcome: &mut RelayOutcome,
    ) -> ProxyResult<OutcomeKind>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let request = InboundRequest::read_from(reader, self.max_line).await?;
        outcome.method.clone_from(&request.method);
        outcome.target.clone_from(&request.target);

        let method = request.method()?;

        if let Some(object) = self.cache.as_ref().and_then(|cache| cache.get(&request.target)) {
            let body = match method {
                Method::Get => &object[..],
                Method::Head => head_section(&object),
            };
            writer.write_all(body).await?;
            outcome.bytes_sent += body.len() as u64;
            return Ok(OutcomeKind::CacheHit);
        }

        let target =
            UpstreamTarget::parse(&request.target).or_host_header(request.host_header().as_deref())?;

        // HEAD is fetched as GET so the full response can be cached
        let upstream_request = self.rewriter.build(Method::Get, &target, &request.headers);

        let upstream = TcpStream::connect((target.host.as_str(), target.port)).await.map_err(|source| {
            ProxyError::UpstreamConnect { host: target.host.clone(), port: target.port, source }
        })?;
        log::debug!("forwarding {} to {}", request.target, target);

        let (upstream_read, mut upstream_write) = upstream.into_split();
        upstream_write.write_all(&upstream_request).await?;
        let mut upstream_reader = BufReader::new(upstream_read);

        let object = self.relay_response(&mut upstream_reader, writer, method, outcome).await?;

        let cached = match (&self.cache, object) {
            (Some(cache), Some(object)) => match store(cache, &request.target, object).await? {
                Ok(index) => {
                    log::debug!("stored {} in slot {} ({:?})", request.target, index, cache.stats());
                    true
                }
                Err(err) => {
                    log::warn!("not caching {}: {}", request.target, err);
                    false
                }
            },
            _ => false,
        };

        Ok(OutcomeKind::Relayed { cached })
    }

    /// Stream the origin response to the client line by line
    ///
    /// Returns the complete response when it is worth caching: a cache is
    /// configured, the response is not empty, and its running total never went
    /// past the object limit.
    async fn relay_response<R, W>(
        &self,
        upstream: &mut R,
        writer: &mut W,
        method: Method,
        outcome: &mut RelayOutcome,
    ) -> ProxyResult<Option<Bytes>>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let limit = self.cache.as_ref().map(|cache| cache.max_object_size());
        let mut accumulating = limit.is_some();
        let mut accumulated = Vec::new();
        let mut total = 0usize;
        let mut forwarding = true;
        let mut at_line_start = true;
        let mut line = Vec::with_capacity(self.max_line.min(8192));

        loop {
            let n = read_line(upstream, &mut line, self.max_line).await?;
            if n == 0 {
                break;
            }
            total += n;

            if accumulating {
                if limit.is_some_and(|limit| total <= limit) {
                    accumulated.extend_from_slice(&line);
                } else {
                    accumulating = false;
                    accumulated = Vec::new();
                }
            }

            if forwarding {
                writer.write_all(&line).await?;
                outcome.bytes_sent += n as u64;
                if method == Method::Head && at_line_start && is_blank_line(&line) {
                    forwarding = false;
                }
            }
            at_line_start = ends_line(&line);
        }

        if !accumulating {
            if limit.is_some() {
                log::debug!("{} bytes exceed the object limit, not caching", total);
            }
            return Ok(None);
        }
        Ok((total > 0).then(|| Bytes::from(accumulated)))
    }
}

/// Insert on the blocking pool
///
/// An insert may wait on slot admission behind readers; that wait must not
/// park a runtime worker. The outer result reports a failed blocking task.
async fn store(cache: &Arc<ObjectCache>, url: &str, object: Bytes) -> ProxyResult<ProxyResult<usize>> {
    let cache = Arc::clone(cache);
    let url = url.to_string();
    tokio::task::spawn_blocking(move || cache.insert(&url, object))
        .await
        .map_err(|err| ProxyError::Io(std::io::Error::other(err)))
}
