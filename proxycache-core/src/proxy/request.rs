//! Inbound request parsing

use std::fmt;
use tokio::io::AsyncBufRead;

use super::io::{ends_line, is_blank_line, read_line};
use crate::error::{ProxyError, ProxyResult};

/// Methods the proxy relays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
}

impl Method {
    /// Case-insensitive match against the supported methods
    pub fn parse(token: &str) -> ProxyResult<Self> {
        if token.eq_ignore_ascii_case("GET") {
            Ok(Self::Get)
        } else if token.eq_ignore_ascii_case("HEAD") {
            Ok(Self::Head)
        } else {
            Err(ProxyError::unsupported_method(token))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request line plus raw header lines, as sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Method token exactly as received; checked separately
    pub method: String,
    /// Request target, absolute or relative; also the cache key
    pub target: String,
    pub version: String,
    /// Header lines in arrival order, terminators included, duplicates kept
    pub headers: Vec<Vec<u8>>,
}

impl InboundRequest {
    /// Split a request line into method, target and version
    ///
    /// A missing version defaults to `HTTP/1.0`.
    pub fn parse_request_line(line: &str) -> ProxyResult<Self> {
        let mut parts = line.split_whitespace();
        let method = parts.next().ok_or_else(|| ProxyError::malformed("empty request line"))?;
        let target = parts
            .next()
            .ok_or_else(|| ProxyError::malformed(format!("missing request target in {:?}", line.trim_end())))?;
        let version = parts.next().unwrap_or("HTTP/1.0");

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers: Vec::new(),
        })
    }

    /// Read the request line and every header line up to the first blank line
    /// or end of stream
    pub async fn read_from<R>(reader: &mut R, max_line: usize) -> ProxyResult<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::with_capacity(256);
        if read_line(reader, &mut line, max_line).await? == 0 {
            return Err(ProxyError::malformed("connection closed before request line"));
        }

        let mut request = Self::parse_request_line(&String::from_utf8_lossy(&line))?;

        // Long header lines arrive in pieces; only a piece that starts a line can end the block
        let mut at_line_start = ends_line(&line);
        loop {
            if read_line(reader, &mut line, max_line).await? == 0 {
                break;
            }
            if at_line_start && is_blank_line(&line) {
                break;
            }
            if at_line_start {
                request.headers.push(line.clone());
            } else if let Some(header) = request.headers.last_mut() {
                header.extend_from_slice(&line);
            }
            // else: tail of an over-long request line
            at_line_start = ends_line(&line);
        }

        Ok(request)
    }

    /// The method, if it is one the proxy supports
    pub fn method(&self) -> ProxyResult<Method> {
        Method::parse(&self.method)
    }

    /// First header line with the given name, compared case-insensitively
    pub fn header_line(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|line| header_name(line).eq_ignore_ascii_case(name.as_bytes()))
            .map(Vec::as_slice)
    }

    /// Trimmed value of the `Host` header, if sent
    pub fn host_header(&self) -> Option<String> {
        let line = self.header_line("Host")?;
        let colon = line.iter().position(|&b| b == b':')?;
        let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
        (!value.is_empty()).then_some(value)
    }
}

/// Name part of a raw header line (everything before the first colon, trimmed)
pub fn header_name(line: &[u8]) -> &[u8] {
    let end = line.iter().position(|&b| b == b':').unwrap_or(line.len());
    line[..end].trim_ascii()
}
