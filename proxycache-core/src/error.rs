//! Error types for proxy operations

use http::StatusCode;

/// Errors raised while relaying a single connection or touching the cache
///
/// Every variant is terminal for the connection it occurred on and for nothing
/// else: there are no retries.
#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    /// Client used a method other than GET or HEAD
    #[error("Unsupported method: {method}")]
    UnsupportedMethod { method: String },

    /// Request line or target could not be understood
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    /// Origin server could not be reached
    #[error("Upstream connection to {host}:{port} failed: {source}")]
    UpstreamConnect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Object handed to the cache is larger than the per-object limit
    #[error("Object of {size} bytes exceeds the cache limit of {limit} bytes")]
    ObjectTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod { method: method.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest { message: message.into() }
    }

    /// Status reported to the client for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMethod { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::MalformedRequest { .. } => StatusCode::BAD_REQUEST,
            Self::UpstreamConnect { .. } => StatusCode::BAD_GATEWAY,
            Self::ObjectTooLarge { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error happens before any response byte is sent, so a status
    /// response can still be written
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMethod { .. } | Self::MalformedRequest { .. } | Self::UpstreamConnect { .. }
        )
    }

    /// Short cause shown in the error page
    fn cause(&self) -> String {
        match self {
            Self::UnsupportedMethod { method } => method.clone(),
            Self::MalformedRequest { message } => message.clone(),
            Self::UpstreamConnect { host, port, .. } => format!("{}:{}", host, port),
            other => other.to_string(),
        }
    }

    fn detail(&self) -> &'static str {
        match self {
            Self::UnsupportedMethod { .. } => "Proxy does not implement this method",
            Self::MalformedRequest { .. } => "Proxy could not parse the request",
            Self::UpstreamConnect { .. } => "Proxy could not reach the origin server",
            _ => "Proxy failed to handle the request",
        }
    }

    /// Complete HTTP/1.0 error response for this error
    pub fn to_response(&self) -> Vec<u8> {
        error_response(self.status(), self.detail(), &self.cause())
    }
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Build a small HTML error response: status line, content headers, body
pub fn error_response(status: StatusCode, detail: &str, cause: &str) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let body = format!(
        "<html><title>Proxy Error</title><body bgcolor=\"ffffff\">\r\n\
         {code}: {reason}\r\n\
         <p>{detail}: {cause}\r\n\
         <hr><em>proxycache</em>\r\n",
        code = status.as_u16(),
        reason = reason,
        detail = detail,
        cause = escape_html(cause),
    );

    let mut response = format!(
        "HTTP/1.0 {} {}\r\nContent-type: text/html\r\nContent-length: {}\r\n\r\n",
        status.as_u16(),
        reason,
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body.as_bytes());
    response
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
