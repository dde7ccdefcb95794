//! Upstream request header rewriting

use super::request::{header_name, Method};
use super::target::UpstreamTarget;

/// User-Agent sent upstream unless configured otherwise
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:10.0.3) Gecko/20120305 Firefox/10.0.3";

/// Client headers replaced by the proxy's own values
const REPLACED_HEADERS: [&str; 4] = ["Host", "Connection", "Proxy-Connection", "User-Agent"];

/// Builds the header block sent to the origin
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    user_agent: String,
}

impl HeaderRewriter {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self { user_agent: user_agent.into() }
    }

    /// Assemble the upstream request
    ///
    /// Layout: request line (always HTTP/1.0), the client's `Host` line or a
    /// synthesized one, `Connection: close`, `Proxy-Connection: close`, the
    /// proxy's `User-Agent`, the remaining client lines verbatim in order, then
    /// a blank line.
    pub fn build(&self, method: Method, target: &UpstreamTarget, client_headers: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::with_capacity(512);
        out.extend_from_slice(format!("{} {} HTTP/1.0\r\n", method, target.path).as_bytes());

        match client_headers.iter().find(|line| is_named(line, "Host")) {
            Some(line) => push_line(&mut out, line),
            None => out.extend_from_slice(format!("Host: {}\r\n", target.host).as_bytes()),
        }

        out.extend_from_slice(b"Connection: close\r\n");
        out.extend_from_slice(b"Proxy-Connection: close\r\n");
        out.extend_from_slice(format!("User-Agent: {}\r\n", self.user_agent).as_bytes());

        for line in client_headers {
            if !REPLACED_HEADERS.iter().any(|name| is_named(line, name)) {
                push_line(&mut out, line);
            }
        }

        out.extend_from_slice(b"\r\n");
        out
    }
}

impl Default for HeaderRewriter {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

fn is_named(line: &[u8], name: &str) -> bool {
    header_name(line).eq_ignore_ascii_case(name.as_bytes())
}

/// Copy a header line, adding CRLF if it arrived unterminated (end of stream)
fn push_line(out: &mut Vec<u8>, line: &[u8]) {
    out.extend_from_slice(line);
    if !line.ends_with(b"\n") {
        out.extend_from_slice(b"\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<Vec<u8>> {
        raw.iter().map(|line| line.as_bytes().to_vec()).collect()
    }

    fn target() -> UpstreamTarget {
        UpstreamTarget::parse("http://www.example.com:8080/index.html")
    }

    #[test]
    fn test_synthesizes_host_and_fixed_headers() {
        let request = HeaderRewriter::default().build(Method::Get, &target(), &[]);
        let expected = format!(
            "GET /index.html HTTP/1.0\r\n\
             Host: www.example.com\r\n\
             Connection: close\r\n\
             Proxy-Connection: close\r\n\
             User-Agent: {}\r\n\
             \r\n",
            DEFAULT_USER_AGENT
        );
        assert_eq!(String::from_utf8(request).unwrap(), expected);
    }

    #[test]
    fn test_keeps_client_host_and_strips_hop_by_hop() {
        let client = lines(&[
            "Accept: */*\r\n",
            "host: www.example.com:8080\r\n",
            "Connection: keep-alive\r\n",
            "Proxy-Connection: keep-alive\r\n",
            "User-Agent: curl/8.0\r\n",
            "Cookie: a=1\r\n",
            "Cookie: b=2\r\n",
        ]);
        let request = HeaderRewriter::new("test-agent").build(Method::Get, &target(), &client);
        let expected = "GET /index.html HTTP/1.0\r\n\
                        host: www.example.com:8080\r\n\
                        Connection: close\r\n\
                        Proxy-Connection: close\r\n\
                        User-Agent: test-agent\r\n\
                        Accept: */*\r\n\
                        Cookie: a=1\r\n\
                        Cookie: b=2\r\n\
                        \r\n";
        assert_eq!(String::from_utf8(request).unwrap(), expected);
    }

    #[test]
    fn test_similar_header_names_pass_through() {
        let client = lines(&["Hostname: h\r\n", "Connection-Id: 7\r\n"]);
        let request = String::from_utf8(HeaderRewriter::new("ua").build(Method::Get, &target(), &client)).unwrap();
        assert!(request.contains("Host: www.example.com\r\n"));
        assert!(request.contains("Hostname: h\r\n"));
        assert!(request.contains("Connection-Id: 7\r\n"));
    }

    #[test]
    fn test_unterminated_line_gets_crlf() {
        let client = lines(&["Accept: */*"]);
        let request = String::from_utf8(HeaderRewriter::new("ua").build(Method::Get, &target(), &client)).unwrap();
        assert!(request.ends_with("Accept: */*\r\n\r\n"));
    }
}
