//! Upstream target parsing
//!
//! Parsing never fails on its own: a missing scheme, port or path falls back to
//! defaults. Only a target with no usable hostname (and no `Host` header to
//! borrow one from) is rejected.

use std::fmt;

use crate::error::{ProxyError, ProxyResult};

pub const DEFAULT_PORT: u16 = 80;

/// Where a cache-missed request is forwarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl UpstreamTarget {
    /// Decompose a request target into hostname, port and path
    ///
    /// Everything after `//` is considered when present, otherwise the whole
    /// string. The authority ends at the first `/`; within it an optional
    /// `:port` follows the hostname. An origin-form target (anything starting
    /// with `/`, such as `/a.html`) is all path and yields an empty hostname,
    /// whatever its path or query contains.
    pub fn parse(target: &str) -> Self {
        if target.starts_with('/') {
            return Self { host: String::new(), port: DEFAULT_PORT, path: target.to_string() };
        }

        let rest = target.find("//").map_or(target, |at| &target[at + 2..]);
        let (authority, path) = match rest.find('/') {
            Some(at) => rest.split_at(at),
            None => (rest, "/"),
        };
        let (host, port) = split_authority(authority);

        Self { host: host.to_string(), port, path: path.to_string() }
    }

    /// Fill an empty hostname (and its port) from the client's `Host` header
    pub fn or_host_header(mut self, host_header: Option<&str>) -> ProxyResult<Self> {
        if self.host.is_empty() {
            if let Some(value) = host_header {
                let (host, port) = split_authority(value);
                self.host = host.to_string();
                self.port = port;
            }
        }

        if self.host.is_empty() {
            return Err(ProxyError::malformed("request target names no host"));
        }
        Ok(self)
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.host, self.port, self.path)
    }
}

/// `host[:port]`; a missing or unparsable port becomes [`DEFAULT_PORT`]
fn split_authority(authority: &str) -> (&str, u16) {
    match authority.split_once(':') {
        Some((host, port)) => {
            let digits = port.find(|c: char| !c.is_ascii_digit()).map_or(port, |end| &port[..end]);
            (host, digits.parse().unwrap_or(DEFAULT_PORT))
        }
        None => (authority, DEFAULT_PORT),
    }
}
